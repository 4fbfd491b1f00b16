use std::sync::{Arc, Mutex};

use pprof::protos::{Function, Line, Location, Profile, Sample, ValueType};

use crate::{Backend, Capture, CpuProfError, Snapshot};

/// A small profile with two stacks:
/// `main;work;hash 3` and `main;idle 1`.
pub fn sample_profile() -> Profile {
    let strings = ["", "samples", "count", "cpu", "nanoseconds", "main", "work", "hash", "idle"];

    let function = |id: u64, name: i64| Function {
        id,
        name,
        system_name: name,
        ..Default::default()
    };

    let location = |id: u64, function_id: u64| Location {
        id,
        line: vec![Line {
            function_id,
            ..Default::default()
        }],
        ..Default::default()
    };

    Profile {
        sample_type: vec![ValueType { ty: 1, unit: 2 }],
        sample: vec![
            Sample {
                location_id: vec![3, 2, 1],
                value: vec![3],
                ..Default::default()
            },
            Sample {
                location_id: vec![4, 1],
                value: vec![1],
                ..Default::default()
            },
        ],
        location: vec![location(1, 1), location(2, 2), location(3, 3), location(4, 4)],
        function: vec![function(1, 5), function(2, 6), function(3, 7), function(4, 8)],
        string_table: strings.iter().map(|s| s.to_string()).collect(),
        period_type: Some(ValueType { ty: 3, unit: 4 }),
        period: 10_000_000,
        ..Default::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Stop,
    Release,
}

/// A backend that records what the session asks of it.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    pub events: Arc<Mutex<Vec<Event>>>,
    pub fail_begin: bool,
    pub fail_stop: Arc<Mutex<bool>>,
    pub profile: Option<Profile>,
}

impl FakeBackend {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events().into_iter().filter(|e| *e == event).count()
    }
}

pub struct FakeCapture {
    events: Arc<Mutex<Vec<Event>>>,
    fail_stop: Arc<Mutex<bool>>,
    profile: Profile,
}

impl Backend for FakeBackend {
    type Capture = FakeCapture;

    fn begin(&self) -> Result<Self::Capture, CpuProfError> {
        if self.fail_begin {
            return Err(CpuProfError::capability("profiler unavailable"));
        }

        self.events.lock().unwrap().push(Event::Begin);

        Ok(FakeCapture {
            events: self.events.clone(),
            fail_stop: self.fail_stop.clone(),
            profile: self.profile.clone().unwrap_or_else(sample_profile),
        })
    }
}

impl Capture for FakeCapture {
    fn stop(&mut self) -> Result<Snapshot, CpuProfError> {
        if *self.fail_stop.lock().unwrap() {
            return Err(CpuProfError::capability("profiler went away"));
        }

        self.events.lock().unwrap().push(Event::Stop);
        Ok(Snapshot::new(self.profile.clone()))
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.events.lock().unwrap().push(Event::Release);
    }
}

/// `value` as an html template escapes it.
pub fn escaped(value: &str) -> String {
    let mut env = minijinja::Environment::new();
    env.add_template("value.html", "{{ value }}").unwrap();
    env.get_template("value.html")
        .unwrap()
        .render(minijinja::context! { value => value })
        .unwrap()
}
