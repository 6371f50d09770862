//! The downstream consumer launched in the `PRESENTING` stage.

use std::{
  path::{Path, PathBuf},
  process::Stdio,
};

use tokio::process::Command;

use crate::{config::PresenterSettings, error::ErrorKind};

/// A command run to completion after the table is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Presenter {
  pub program: PathBuf,
  pub args:    Vec<String>,
}

impl Presenter {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self { program: program.into(), args }
  }

  /// Resolve the configured presenter. `None` when disabled; defaults to
  /// this executable's `report` subcommand against `config_path`.
  pub fn from_settings(
    settings: &PresenterSettings,
    config_path: &Path,
  ) -> std::io::Result<Option<Self>> {
    if !settings.enabled {
      return Ok(None);
    }
    if let Some((program, args)) = settings.command.as_deref().and_then(<[_]>::split_first) {
      return Ok(Some(Self::new(program, args.to_vec())));
    }
    let exe = std::env::current_exe()?;
    Ok(Some(Self::new(exe, vec![
      "--config".to_string(),
      config_path.to_string_lossy().into_owned(),
      "report".to_string(),
    ])))
  }

  /// Run to completion. Stdout passes through; stderr is captured so a
  /// failure can carry it.
  pub async fn run(&self) -> Result<i32, ErrorKind> {
    tracing::info!(program = %self.program.display(), args = ?self.args, "launching presenter");

    let output = Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::null())
      .stdout(Stdio::inherit())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| ErrorKind::Spawn {
        program: self.program.display().to_string(),
        reason:  e.to_string(),
      })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
      return Err(ErrorKind::StageFailed {
        status: output.status.to_string(),
        stderr,
      });
    }
    if !stderr.is_empty() {
      tracing::debug!(%stderr, "presenter stderr");
    }
    Ok(output.status.code().unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sh(script: &str) -> Presenter {
    Presenter::new("sh", vec!["-c".into(), script.into()])
  }

  #[test]
  fn disabled_presenter_resolves_to_none() {
    let s = PresenterSettings { enabled: false, command: None };
    assert!(Presenter::from_settings(&s, Path::new("tally.toml")).unwrap().is_none());
  }

  #[test]
  fn configured_command_is_split_into_program_and_args() {
    let s = PresenterSettings {
      enabled: true,
      command: Some(vec!["dash".into(), "--port".into(), "8050".into()]),
    };
    let p = Presenter::from_settings(&s, Path::new("tally.toml")).unwrap().unwrap();
    assert_eq!(p, Presenter::new("dash", vec!["--port".into(), "8050".into()]));
  }

  #[test]
  fn default_presenter_is_the_report_subcommand() {
    let p = Presenter::from_settings(&PresenterSettings::default(), Path::new("conf.toml"))
      .unwrap()
      .unwrap();
    assert_eq!(p.args, ["--config", "conf.toml", "report"]);
  }

  #[tokio::test]
  async fn zero_exit_is_success() {
    assert_eq!(sh("exit 0").run().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn non_zero_exit_carries_status_and_stderr() {
    let err = sh("echo 'no table' >&2; exit 3").run().await.unwrap_err();
    match err {
      ErrorKind::StageFailed { status, stderr } => {
        assert!(status.contains('3'), "{status}");
        assert_eq!(stderr, "no table");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn missing_program_is_a_spawn_error() {
    let err = Presenter::new("/nonexistent/presenter", vec![]).run().await.unwrap_err();
    assert!(matches!(err, ErrorKind::Spawn { .. }));
  }
}
