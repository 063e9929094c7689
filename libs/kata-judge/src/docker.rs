// Docker container backend using Bollard
//
// One container per execution: network disabled, memory/CPU limits from the
// language config, source injected base64-encoded through the environment.

use crate::engine::{RawExecution, Sandbox, SandboxRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use kata_common::config::LanguageConfig;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Drop cannot be async; removal is handed to the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

pub struct DockerSandbox {
    docker: Docker,
}

impl DockerSandbox {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure the image is present locally, pulling it on a cache miss
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss - pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    async fn collect_output(
        &self,
        container_id: &str,
        max_output_bytes: usize,
    ) -> (String, String, Option<i64>, bool) {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut truncated = false;

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs_stream = self.docker.logs(container_id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => {
                    truncated |= push_capped(&mut stdout, &message, max_output_bytes);
                }
                Ok(LogOutput::StdErr { message }) => {
                    truncated |= push_capped(&mut stderr, &message, max_output_bytes);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container_id = %container_id, error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };

        // Bollard reports a non-zero exit as a wait error that still carries the code
        let mut exit_code = None;
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        match wait_stream.next().await {
            Some(Ok(response)) => exit_code = Some(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                exit_code = Some(code)
            }
            Some(Err(e)) => warn!(container_id = %container_id, error = %e, "Failed to get exit code"),
            None => warn!(container_id = %container_id, "No wait response from container"),
        }

        (stdout, stderr, exit_code, truncated)
    }
}

fn shell_command(config: &LanguageConfig) -> String {
    let file = format!("/tmp/main{}", config.execution.file_extension);
    let mut parts = vec![config.execution.command.clone()];
    parts.extend(config.execution.args.iter().cloned());
    parts.push(file.clone());
    format!(
        "echo \"$SOURCE_CODE\" | base64 -d > {} && exec {}",
        file,
        parts.join(" ")
    )
}

/// Append lossily-decoded bytes, returning true once the cap has been hit
fn push_capped(buf: &mut String, message: &[u8], limit: usize) -> bool {
    if buf.len() >= limit {
        return true;
    }
    let text = String::from_utf8_lossy(message);
    let room = limit - buf.len();
    if text.len() <= room {
        buf.push_str(&text);
        return false;
    }
    let mut cut = room;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    buf.push_str(&text[..cut]);
    true
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, request: SandboxRequest) -> Result<RawExecution> {
        let image = request.config.image.clone();
        let container_name = format!("kata-{}", uuid::Uuid::new_v4());

        self.ensure_image(&image)
            .await
            .with_context(|| format!("Failed to ensure Docker image '{}' is available", image))?;

        let env = vec![
            format!("SOURCE_CODE={}", general_purpose::STANDARD.encode(&request.source)),
            format!("LANGUAGE={}", request.language),
            "PYTHONUNBUFFERED=1".to_string(),
            "NODE_NO_WARNINGS=1".to_string(),
        ];

        let config = Config {
            image: Some(image.clone()),
            cmd: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                shell_command(&request.config),
            ]),
            entrypoint: Some(vec![]),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(request.config.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((request.config.cpu_limit * 1_000_000_000.0) as i64),
                readonly_rootfs: Some(false), // source is written to /tmp
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .context("Failed to create Docker container")?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        let start_time = Instant::now();

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start Docker container")?;

        let outcome = tokio::time::timeout(
            request.wall_cap,
            self.collect_output(&container_id, request.max_output_bytes),
        )
        .await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match outcome {
            Ok((stdout, mut stderr, exit_code, output_truncated)) => {
                match exit_code {
                    Some(137) => stderr.push_str("\n[Container killed: likely OOM or exceeded memory limit]"),
                    Some(139) => stderr.push_str("\n[Container killed: segmentation fault]"),
                    _ => {}
                }
                debug!(
                    container_id = %container_id,
                    exit_code = ?exit_code,
                    execution_ms = execution_time_ms,
                    "Container exited"
                );
                Ok(RawExecution {
                    stdout,
                    stderr,
                    exit_code,
                    wall_cap_exceeded: false,
                    output_truncated,
                    execution_time_ms,
                })
            }
            Err(_) => {
                warn!(
                    container_id = %container_id,
                    wall_cap_ms = request.wall_cap.as_millis() as u64,
                    "Container exceeded wall cap - killing"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container_id = %container_id, error = %e, "Failed to kill container");
                }
                Ok(RawExecution {
                    wall_cap_exceeded: true,
                    execution_time_ms,
                    ..RawExecution::default()
                })
            }
        }
    }
}
