//! The generation run: an ordered sequence of named, checkpointed steps.
//!
//! Each run owns exactly one project record, created before any other side
//! effect. Steps execute strictly in order and checkpoint their results in
//! the run ledger, so a replayed run skips completed work instead of
//! repeating it. Any step failure after the record exists is intercepted
//! once: the project is marked failed with the error durably recorded, then
//! the error propagates. A run never ends in `generating`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, info};

use crate::config::{MODEL_TIMEOUT_SECS, SERVICE_PORT};
use crate::errors::GenerationError;

use super::extract::{extract_json, language_from_path, validate_generated_project};
use super::fsstore;
use super::llm::ModelClient;
use super::models::*;
use super::prompt::{DEFAULT_PROMPT, GENERATION_SYSTEM_PROMPT, generation_prompt};
use super::sandbox::SandboxClient;
use super::store::StoreHandle;

/// Orchestrates generation runs against injected collaborators.
pub struct RunWorkflow {
    store: StoreHandle,
    model: Arc<dyn ModelClient>,
    /// Absent means sandbox steps are skipped entirely.
    sandbox: Option<Arc<dyn SandboxClient>>,
    data_dir: PathBuf,
    model_timeout: Duration,
}

impl RunWorkflow {
    pub fn new(
        store: StoreHandle,
        model: Arc<dyn ModelClient>,
        sandbox: Option<Arc<dyn SandboxClient>>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            model,
            sandbox,
            data_dir,
            model_timeout: Duration::from_secs(MODEL_TIMEOUT_SECS),
        }
    }

    /// Override the model call budget. Used by tests.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Execute one run to a terminal status. Returns the final project
    /// record on success; a failure is recorded on the project before the
    /// error is returned.
    pub async fn run(&self, request: RunRequest) -> Result<Project> {
        let prompt = if request.value.trim().is_empty() {
            DEFAULT_PROMPT.to_string()
        } else {
            request.value.clone()
        };

        // Step 1: create-project-record. Not ledgered (the row itself is the
        // checkpoint) and not routed through the failure handler, since there
        // is no record to mark failed yet.
        let project = {
            let prompt = prompt.clone();
            self.store
                .call(move |db| db.create_project(&prompt))
                .await
                .context("Failed to create project record")?
        };
        info!(project_id = %project.id, "run started");

        let outcome = self.execute(&project.id, &prompt).await;
        self.finish(&project.id, outcome).await
    }

    /// Replay an interrupted run. Completed steps are skipped via the
    /// ledger; the remainder executes to a terminal status. A project
    /// already terminal is returned unchanged.
    pub async fn resume(&self, project_id: &str) -> Result<Project> {
        let project = {
            let id = project_id.to_string();
            self.store
                .call(move |db| db.get_project(&id))
                .await?
                .with_context(|| format!("Project {} not found", project_id))?
        };
        if project.status.is_terminal() {
            return Ok(project);
        }
        info!(project_id = %project.id, "run resumed");

        let outcome = self.execute(&project.id, &project.prompt).await;
        self.finish(&project.id, outcome).await
    }

    /// Single failure boundary for steps 2 onward: a failed run is marked
    /// terminal with its error before the error propagates.
    async fn finish(&self, project_id: &str, outcome: Result<Project>) -> Result<Project> {
        match outcome {
            Ok(done) => {
                info!(project_id, "run completed");
                Ok(done)
            }
            Err(err) => {
                error!(project_id, error = %err, "run failed");
                // Record the whole context chain, not just the outermost
                // message, so the root cause survives on the project row.
                self.mark_failed(project_id, &format!("{:#}", err)).await;
                Err(err)
            }
        }
    }

    /// Steps 2 through 8, in order. Any error here fails the whole run.
    async fn execute(&self, project_id: &str, prompt: &str) -> Result<Project> {
        let generated: GeneratedProject = self
            .step(project_id, "generate-code", async {
                self.generate_code(prompt).await
            })
            .await?;

        let project_root = fsstore::project_dir(&self.data_dir, project_id);
        let output_path: String = {
            let generated = generated.clone();
            let project_root = project_root.clone();
            self.step(project_id, "save-files", async move {
                for file in &generated.files {
                    fsstore::save_file(&project_root, &file.path, &file.content).await?;
                }
                Ok(project_root.to_string_lossy().into_owned())
            })
            .await?
        };

        if let Some(sandbox) = &self.sandbox {
            let handle: String = self
                .step(project_id, "create-sandbox", async {
                    sandbox.create().await.context("Failed to create sandbox")
                })
                .await?;

            let written: usize = {
                let generated = generated.clone();
                let handle = handle.clone();
                self.step(project_id, "write-to-sandbox", async move {
                    for file in &generated.files {
                        if let Some(parent) = std::path::Path::new(&file.path).parent()
                            && !parent.as_os_str().is_empty()
                        {
                            sandbox
                                .make_dir(&handle, &parent.to_string_lossy())
                                .await
                                .with_context(|| {
                                    format!("Failed to create sandbox dir for {}", file.path)
                                })?;
                        }
                        sandbox
                            .write_file(&handle, &file.path, &file.content)
                            .await
                            .with_context(|| {
                                format!("Failed to write {} to sandbox", file.path)
                            })?;
                    }
                    Ok(generated.files.len())
                })
                .await?
            };
            info!(project_id, files = written, "sandbox populated");

            let url: String = {
                let handle = handle.clone();
                self.step(project_id, "get-sandbox-url", async move {
                    sandbox
                        .exposed_host(&handle, SERVICE_PORT)
                        .await
                        .context("Failed to expose sandbox port")
                })
                .await?
            };
            info!(project_id, %url, "sandbox exposed");
        }

        let _count: usize = {
            let generated = generated.clone();
            let store = self.store.clone();
            let project_id_owned = project_id.to_string();
            self.step(project_id, "save-file-records", async move {
                let files: Vec<GeneratedFile> = generated
                    .files
                    .iter()
                    .map(|f| GeneratedFile {
                        path: f.path.clone(),
                        content: f.content.clone(),
                        language: f
                            .language
                            .clone()
                            .or_else(|| language_from_path(&f.path).map(String::from)),
                    })
                    .collect();
                store
                    .call(move |db| db.create_files(&project_id_owned, &files))
                    .await
            })
            .await?
        };

        let project: Project = {
            let store = self.store.clone();
            let project_id_owned = project_id.to_string();
            self.step(project_id, "update-project-status", async move {
                store
                    .call(move |db| {
                        db.update_project(
                            &project_id_owned,
                            ProjectStatus::Completed,
                            Some(&generated.name),
                            Some(&generated.description),
                            Some(&output_path),
                            None,
                        )
                    })
                    .await
            })
            .await?
        };
        Ok(project)
    }

    /// Step 2: model call under a timeout, extraction, validation, and path
    /// sanitization. One failure class for the caller.
    async fn generate_code(&self, prompt: &str) -> Result<GeneratedProject> {
        let user_prompt = generation_prompt(prompt);
        let response = tokio::time::timeout(
            self.model_timeout,
            self.model.complete(GENERATION_SYSTEM_PROMPT, &user_prompt),
        )
        .await
        .map_err(|_| GenerationError::Timeout {
            secs: self.model_timeout.as_secs(),
        })?
        .map_err(|e| GenerationError::ModelCall(e.to_string()))?;

        let value = extract_json(&response).map_err(GenerationError::from)?;
        if !validate_generated_project(&value) {
            return Err(GenerationError::InvalidShape.into());
        }
        let mut generated: GeneratedProject =
            serde_json::from_value(value).context("Failed to decode generated project")?;
        for file in &mut generated.files {
            file.path = fsstore::sanitize_path(&file.path);
        }
        Ok(generated)
    }

    /// Run a named step through the ledger: return the recorded result if the
    /// step already completed, otherwise execute it and record its result.
    async fn step<T, Fut>(&self, project_id: &str, name: &'static str, fut: Fut) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Fut: Future<Output = Result<T>>,
    {
        let prior = {
            let project_id = project_id.to_string();
            self.store
                .call(move |db| db.completed_step(&project_id, name))
                .await?
        };
        if let Some(recorded) = prior {
            info!(project_id, step = name, "step already completed, skipping");
            return serde_json::from_str(&recorded)
                .with_context(|| format!("Failed to decode recorded result of step {}", name));
        }

        info!(project_id, step = name, "step started");
        let result = fut
            .await
            .with_context(|| format!("Step {} failed", name))?;

        let recorded = serde_json::to_string(&result)
            .with_context(|| format!("Failed to encode result of step {}", name))?;
        {
            let project_id = project_id.to_string();
            self.store
                .call(move |db| db.record_step(&project_id, name, &recorded))
                .await?;
        }
        info!(project_id, step = name, "step completed");
        Ok(result)
    }

    /// Terminal failure write. Best effort: a project already in a terminal
    /// state (a replayed failed run) is left as-is.
    async fn mark_failed(&self, project_id: &str, message: &str) {
        let project_id_owned = project_id.to_string();
        let message = message.to_string();
        let result = self
            .store
            .call(move |db| {
                db.update_project(
                    &project_id_owned,
                    ProjectStatus::Failed,
                    None,
                    None,
                    None,
                    Some(&message),
                )
            })
            .await;
        if let Err(err) = result {
            error!(project_id, error = %err, "could not record run failure");
        }
    }
}

/// Summary payload returned to invoke callers.
pub fn invoke_receipt(event_id: &str) -> serde_json::Value {
    json!({
        "success": true,
        "message": format!("Event '{}' dispatched", RUN_EVENT),
        "event_id": event_id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::AgentDb;
    use async_trait::async_trait;

    struct ScriptedModel {
        response: String,
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl ModelClient for SlowModel {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            unreachable!("model sleep should outlive the test timeout");
        }
    }

    fn project_json() -> String {
        r#"```json
{
  "name": "hello-app",
  "description": "Says hello",
  "files": [
    {"path": "index.html", "content": "<h1>hi</h1>"},
    {"path": "src/app.js", "content": "console.log('hi')"}
  ]
}
```"#
            .to_string()
    }

    fn workflow(model: Arc<dyn ModelClient>, dir: &std::path::Path) -> RunWorkflow {
        let store = StoreHandle::new(AgentDb::new_in_memory().unwrap());
        RunWorkflow::new(store, model, None, dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_run_completes_without_sandbox() {
        let tmp = tempfile::tempdir().unwrap();
        let wf = workflow(
            Arc::new(ScriptedModel {
                response: project_json(),
            }),
            tmp.path(),
        );

        let project = wf.run(RunRequest { value: "hello".into() }).await.unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.name, "hello-app");
        assert_eq!(project.description, "Says hello");
        assert!(project.output_path.is_some());
        assert!(tmp.path().join(&project.id).join("index.html").exists());
    }

    #[tokio::test]
    async fn test_run_fails_on_malformed_output() {
        let tmp = tempfile::tempdir().unwrap();
        let wf = workflow(
            Arc::new(ScriptedModel {
                response: "I can't do that".into(),
            }),
            tmp.path(),
        );

        let err = wf
            .run(RunRequest { value: "hello".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("generate-code"));
    }

    #[tokio::test]
    async fn test_model_timeout_fails_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let wf = workflow(Arc::new(SlowModel), tmp.path())
            .with_model_timeout(Duration::from_millis(20));

        let err = wf
            .run(RunRequest { value: "hello".into() })
            .await
            .unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.contains("timeout"));
    }

    #[tokio::test]
    async fn test_invoke_receipt_shape() {
        let receipt = invoke_receipt("evt-1");
        assert_eq!(receipt["success"], true);
        assert_eq!(receipt["event_id"], "evt-1");
        assert!(receipt["message"].as_str().unwrap().contains(RUN_EVENT));
        assert!(receipt["timestamp"].as_str().is_some());
    }
}
