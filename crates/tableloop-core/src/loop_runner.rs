use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use tableloop_agent::{extract_code, Generator};
use tableloop_executor::{ArtifactPreview, ArtifactProbe, CandidateExecutor, ExecutionResult};
use tableloop_logging::{LogEvent, Logger, TranscriptWriter};
use tableloop_oracle::{ComparisonResult, CsvReference, Oracle, ReferenceSource, Table};

use crate::context::{AttemptRecord, Candidate, LoopState};
use crate::error::LoopError;
use crate::outcome::LoopOutcome;
use crate::{CandidateStore, PromptBuilder, TaskSpec};

/// Orchestrates the generate, execute, verify, retry loop
pub struct LoopRunner<'a> {
    generator: &'a dyn Generator,
    executor: &'a dyn CandidateExecutor,
    probe: &'a dyn ArtifactProbe,
    store: &'a dyn CandidateStore,
    reference: &'a dyn ReferenceSource,
    prompts: PromptBuilder,
    logger: Arc<Logger>,
    transcript: Option<Arc<TranscriptWriter>>,
    interrupted: Arc<AtomicBool>,
}

/// Everything loaded once per task and shared by all attempts
struct TaskInputs<'t> {
    task: &'t TaskSpec,
    expected: Table,
    preview: ArtifactPreview,
}

impl<'a> LoopRunner<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        executor: &'a dyn CandidateExecutor,
        probe: &'a dyn ArtifactProbe,
        store: &'a dyn CandidateStore,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            generator,
            executor,
            probe,
            store,
            reference: &CsvReference,
            prompts: PromptBuilder::default(),
            logger,
            transcript: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_reference(mut self, reference: &'a dyn ReferenceSource) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_transcript(mut self, transcript: Arc<TranscriptWriter>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Get a handle to signal interruption. Checked between attempts only.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Run the loop for one task.
    ///
    /// Missing inputs and an unreadable reference are returned as errors
    /// before any attempt. Once attempts start, every ending is a
    /// [`LoopOutcome`].
    pub async fn run(&self, task: &TaskSpec) -> Result<LoopOutcome, LoopError> {
        task.check_inputs()?;
        let expected = self.reference.load(task.reference())?;
        let preview = self.probe.probe(task.input()).await;
        let (rows, columns) = expected.shape();

        self.logger.log(&LogEvent::TaskStarted {
            task_id: task.id().to_string(),
            input: task.input().to_path_buf(),
            reference: task.reference().to_path_buf(),
            max_attempts: task.max_attempts(),
            expected_rows: rows,
            expected_columns: columns,
        });
        if let Some(ref transcript) = self.transcript {
            transcript.write_start(
                task.id(),
                task.input(),
                task.reference(),
                self.generator.name(),
                self.generator.model(),
                task.max_attempts(),
            );
        }

        let inputs = TaskInputs {
            task,
            expected,
            preview,
        };
        let outcome = self.drive(&inputs, LoopState::new(task.max_attempts())).await;

        if let Some(ref transcript) = self.transcript {
            transcript.write_end(
                outcome.status(),
                outcome.attempts(),
                outcome.total_duration_secs(),
            );
        }
        Ok(outcome)
    }

    async fn drive(&self, inputs: &TaskInputs<'_>, mut state: LoopState) -> LoopOutcome {
        loop {
            if !state.can_start_attempt() {
                self.logger.log(&LogEvent::AttemptsExhausted {
                    attempts: state.attempt(),
                });
                let duration = state.total_duration();
                let attempts = state.attempt();
                let last_diagnostic = state.last_diagnostic().cloned();
                return LoopOutcome::exhausted(
                    attempts,
                    last_diagnostic,
                    state.into_history(),
                    duration,
                );
            }

            if self.interrupted.load(Ordering::SeqCst) {
                info!("Loop interrupted by user");
                let duration = state.total_duration();
                return LoopOutcome::interrupted(state.attempt(), state.into_history(), duration);
            }

            match self.run_attempt(inputs, &mut state).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Fatal error during attempt");
                    self.logger.log(&LogEvent::ErrorEncountered {
                        attempt: state.attempt(),
                        error: e.to_string(),
                    });
                    let duration = state.total_duration();
                    return LoopOutcome::failed(
                        state.attempt(),
                        e.to_string(),
                        state.into_history(),
                        duration,
                    );
                }
            }
        }
    }

    /// Run one attempt.
    /// Returns Some(outcome) on success, None when the loop should go on.
    async fn run_attempt(
        &self,
        inputs: &TaskInputs<'_>,
        state: &mut LoopState,
    ) -> Result<Option<LoopOutcome>, LoopError> {
        let task = inputs.task;
        let attempt = state.begin_attempt();

        let request = self.prompts.build(
            task,
            &inputs.expected,
            &inputs.preview,
            state.feedback(),
            attempt,
        );
        self.logger.log(&LogEvent::AttemptStarted {
            attempt,
            max_attempts: state.max_attempts(),
            prompt_chars: request.prompt.chars().count(),
        });

        debug!(attempt, generator = self.generator.name(), "Requesting candidate");
        let generation_start = Instant::now();
        let raw = self.generator.generate(&request).await?;
        let code = extract_code(&raw);
        let generation_secs = generation_start.elapsed().as_secs_f64();
        self.logger.log(&LogEvent::GenerationCompleted {
            attempt,
            code_chars: code.chars().count(),
            duration_secs: generation_secs,
        });

        let path = self
            .store
            .persist(task.id(), &code)
            .map_err(LoopError::Persist)?;
        self.logger.log(&LogEvent::CandidatePersisted {
            attempt,
            path: path.clone(),
        });
        state.begin_testing();

        let execution_start = Instant::now();
        let result = self.executor.execute(&path, task.input()).await?;
        let execution_secs = execution_start.elapsed().as_secs_f64();
        let execution = result.label().to_string();
        self.logger.log(&LogEvent::ExecutionCompleted {
            attempt,
            outcome: execution.clone(),
            duration_secs: execution_secs,
        });

        let verdict = match result {
            ExecutionResult::Produced(value) => Oracle::compare(&value, &inputs.expected),
            ExecutionResult::Failed(failure) => ComparisonResult::Mismatch(failure.into_diagnostic()),
        };

        let diagnostic = match verdict {
            ComparisonResult::Success => None,
            ComparisonResult::Mismatch(diagnostic) => Some(diagnostic),
        };
        let diagnostic_text = diagnostic.as_ref().map(|d| d.to_string());

        self.logger.log(&LogEvent::VerdictReached {
            attempt,
            passed: diagnostic.is_none(),
            kind: diagnostic.as_ref().map(|d| d.kind().to_string()),
            detail: diagnostic_text.clone().unwrap_or_default(),
        });

        let record = AttemptRecord {
            attempt,
            code_chars: code.chars().count(),
            candidate_path: path.clone(),
            execution,
            passed: diagnostic.is_none(),
            diagnostic_kind: diagnostic.as_ref().map(|d| d.kind()),
            diagnostic: diagnostic.clone(),
            diagnostic_text,
            generation_secs,
            execution_secs,
            timestamp: Utc::now(),
        };
        if let Some(ref transcript) = self.transcript {
            transcript.write_attempt(&record);
        }
        state.push_record(record);

        let candidate = Candidate {
            attempt,
            code,
            path: path.clone(),
        };

        match diagnostic {
            None => {
                state.record_success(candidate);
                let duration = state.total_duration();
                self.logger.log(&LogEvent::TaskCompleted {
                    attempts: attempt,
                    candidate_path: path.clone(),
                    duration_secs: duration.as_secs_f64(),
                });
                Ok(Some(LoopOutcome::success(
                    attempt,
                    path,
                    state.history().to_vec(),
                    duration,
                )))
            }
            Some(diagnostic) => {
                info!(
                    attempt,
                    verdict = %diagnostic.short_description(),
                    "Candidate rejected"
                );
                state.record_failure(candidate, diagnostic);
                Ok(None)
            }
        }
    }
}
