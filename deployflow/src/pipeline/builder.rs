//! Sequencer builder with validation.

use super::sequencer::StageSequencer;
use super::stage::Stage;
use crate::errors::ValidationError;
use crate::events::{EventSink, NoOpEventSink};
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated sequencers.
#[derive(Clone)]
pub struct SequencerBuilder {
    name: String,
    stages: Vec<Stage>,
    names: HashSet<String>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for SequencerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencerBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl SequencerBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is already taken.
    pub fn stage(mut self, stage: Stage) -> Result<Self, ValidationError> {
        self.add_stage(stage)?;
        Ok(self)
    }

    /// Appends a stage in place.
    ///
    /// # Errors
    ///
    /// See [`SequencerBuilder::stage`].
    pub fn add_stage(&mut self, stage: Stage) -> Result<(), ValidationError> {
        stage.validate()?;

        if !self.names.insert(stage.name.clone()) {
            return Err(ValidationError::new(format!("Duplicate stage name '{}'", stage.name))
                .with_stages(vec![stage.name]));
        }

        self.stages.push(stage);
        Ok(())
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the sequencer.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or no stages were added.
    pub fn build(self) -> Result<StageSequencer, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("Sequence name cannot be empty or whitespace-only"));
        }
        if self.stages.is_empty() {
            return Err(ValidationError::new(format!(
                "Sequence '{}' has no stages",
                self.name
            )));
        }

        Ok(StageSequencer {
            name: self.name,
            stages: self.stages,
            sink: self.sink,
        })
    }
}
