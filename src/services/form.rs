//! Submission lifecycle for compound forms
//!
//! A submission starts `Idle`, optionally stores an image, then writes the
//! record and ends in `Success` or `Error`. Only `reset` leaves a terminal
//! stage. The stages visited are returned to the client with the result.

use serde::Serialize;
use std::fmt;

use super::ActionError;

/// Stage of a form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "message", rename_all = "snake_case")]
pub enum FormStage {
    Idle,
    UploadingImage,
    Creating,
    Updating,
    Success,
    Error(String),
}

impl FormStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FormStage::Success | FormStage::Error(_))
    }

    fn name(&self) -> &'static str {
        match self {
            FormStage::Idle => "idle",
            FormStage::UploadingImage => "uploading_image",
            FormStage::Creating => "creating",
            FormStage::Updating => "updating",
            FormStage::Success => "success",
            FormStage::Error(_) => "error",
        }
    }

    /// Whether `self -> next` is an allowed step (reset excluded)
    fn allows(&self, next: &FormStage) -> bool {
        use FormStage::*;
        match (self, next) {
            (s, Error(_)) => !s.is_terminal(),
            (Idle, UploadingImage | Creating | Updating) => true,
            (UploadingImage, Creating | Updating) => true,
            (Creating | Updating, Success) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FormStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected stage change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid form transition from {from} to {to}")]
pub struct FormTransitionError {
    pub from: FormStage,
    pub to: FormStage,
}

impl From<FormTransitionError> for ActionError {
    fn from(err: FormTransitionError) -> Self {
        ActionError::Internal(anyhow::Error::new(err))
    }
}

/// Current stage plus the trail of stages visited
#[derive(Debug, Clone)]
pub struct FormState {
    stage: FormStage,
    trail: Vec<FormStage>,
}

impl Default for FormState {
    fn default() -> Self {
        Self::new()
    }
}

impl FormState {
    pub fn new() -> Self {
        Self {
            stage: FormStage::Idle,
            trail: vec![FormStage::Idle],
        }
    }

    pub fn stage(&self) -> &FormStage {
        &self.stage
    }

    pub fn stages(&self) -> &[FormStage] {
        &self.trail
    }

    /// Move to `next` if the step is allowed
    pub fn advance(&mut self, next: FormStage) -> Result<(), FormTransitionError> {
        if !self.stage.allows(&next) {
            return Err(FormTransitionError {
                from: self.stage.clone(),
                to: next,
            });
        }
        tracing::trace!(from = %self.stage, to = %next, "Form stage");
        self.stage = next.clone();
        self.trail.push(next);
        Ok(())
    }

    /// Record a failure, leaving a terminal stage untouched
    pub fn fail(&mut self, message: impl Into<String>) {
        let _ = self.advance(FormStage::Error(message.into()));
    }

    /// Return to `Idle` after `Success` or `Error`
    pub fn reset(&mut self) -> Result<(), FormTransitionError> {
        if !self.stage.is_terminal() {
            return Err(FormTransitionError {
                from: self.stage.clone(),
                to: FormStage::Idle,
            });
        }
        self.stage = FormStage::Idle;
        self.trail = vec![FormStage::Idle];
        Ok(())
    }

    /// Mark the outcome of a step, passing the result through
    pub fn settle<T>(&mut self, result: Result<T, ActionError>) -> Result<T, ActionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    pub fn into_stages(self) -> Vec<FormStage> {
        self.trail
    }
}

/// Record produced by a completed submission
#[derive(Debug, Clone, Serialize)]
pub struct Submitted<T> {
    pub record: T,
    pub stages: Vec<FormStage>,
}

impl<T> Submitted<T> {
    pub fn new(record: T, state: FormState) -> Self {
        Self {
            record,
            stages: state.into_stages(),
        }
    }
}
