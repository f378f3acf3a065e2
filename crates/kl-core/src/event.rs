use crate::id::ModelId;

/// What kind of kernel event occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEventKind {
    /// A model was created and configured.
    ModelCreated {
        /// The new model.
        model: ModelId,
    },
    /// A model (and its subtree) was removed.
    ModelDestroyed {
        /// The removed model.
        model: ModelId,
    },
    /// A model's commanded motion was blocked by an obstacle.
    Stalled {
        /// The blocked model.
        model: ModelId,
    },
    /// A device could not resolve the sibling it samples.
    MissingReference {
        /// The device model.
        model: ModelId,
        /// The name of the unresolved reference.
        reference: String,
    },
    /// A model's update returned an error; the cycle continued.
    UpdateFailed {
        /// The failing model.
        model: ModelId,
    },
    /// A configuration section was rejected and skipped.
    ConfigRejected {
        /// Index of the rejected section in its source.
        section: usize,
    },
}

impl SimEventKind {
    /// Check whether a given model is involved in this event.
    pub fn involves(&self, id: ModelId) -> bool {
        match self {
            Self::ModelCreated { model }
            | Self::ModelDestroyed { model }
            | Self::Stalled { model }
            | Self::MissingReference { model, .. }
            | Self::UpdateFailed { model } => *model == id,
            Self::ConfigRejected { .. } => false,
        }
    }
}

/// A record of something that happened during simulation.
#[derive(Debug, Clone)]
pub struct SimEvent {
    /// Simulated time in milliseconds when this event occurred.
    pub time: u64,
    /// The specific kind of event that occurred.
    pub kind: SimEventKind,
    /// A human-readable description of the event.
    pub description: String,
}

impl SimEvent {
    /// Create a new event with the given time, kind, and description.
    pub fn new(time: u64, kind: SimEventKind, description: impl Into<String>) -> Self {
        Self {
            time,
            kind,
            description: description.into(),
        }
    }
}

/// Accumulates events during a simulation run.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log with the given maximum capacity (0 = unlimited).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events,
        }
    }

    /// Append an event, dropping the oldest events if the log exceeds its capacity.
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
        if self.max_events > 0 && self.events.len() > self.max_events {
            let drain_count = self.events.len() - self.max_events;
            self.events.drain(..drain_count);
        }
    }

    /// Return a slice of all recorded events.
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Return all events involving the given model.
    pub fn events_for_model(&self, id: ModelId) -> Vec<&SimEvent> {
        self.events.iter().filter(|e| e.kind.involves(id)).collect()
    }

    /// Count events matching a predicate.
    pub fn count(&self, pred: impl Fn(&SimEventKind) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.kind)).count()
    }

    /// Return the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Return `true` if no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
