//! Stages the remote script with scp

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use super::{ExecutableLocator, PathLocator, Uploader};
use crate::target::Target;
use crate::{Error, Result};

/// Uploads a single file with the local `scp` client
#[derive(Debug, Clone)]
pub struct ScpUploader {
    /// scp client program, looked up in PATH
    program: String,
    /// Passed as `StrictHostKeyChecking=yes|no`
    strict_host_key_checking: bool,
}

impl ScpUploader {
    pub fn new(program: impl Into<String>, strict_host_key_checking: bool) -> Self {
        Self {
            program: program.into(),
            strict_host_key_checking,
        }
    }

    fn command_line(
        &self,
        scp: PathBuf,
        local: &Path,
        remote: &str,
        target: &Target,
    ) -> Vec<String> {
        let mut argv = vec![
            scp.to_string_lossy().into_owned(),
            "-q".to_string(),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.strict_host_key_checking { "yes" } else { "no" }
            ),
            "-P".to_string(),
            target.port.to_string(),
        ];
        if let Some(key) = target.identity_file() {
            argv.push("-i".to_string());
            argv.push(key.to_string_lossy().into_owned());
        }
        argv.push(local.to_string_lossy().into_owned());
        argv.push(format!("{}:{}", target.destination(), remote));
        argv
    }
}

impl Default for ScpUploader {
    fn default() -> Self {
        Self::new("scp", false)
    }
}

#[async_trait]
impl Uploader for ScpUploader {
    async fn upload(&self, local: &Path, remote: &str, target: &Target) -> Result<()> {
        let scp = PathLocator
            .locate(&self.program)
            .ok_or_else(|| Error::ExecutorNotFound(self.program.clone()))?;

        let argv = self.command_line(scp, local, remote, target);
        tracing::debug!("Uploading {:?} -> {}:{}", local, target.name, remote);

        let output = tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Staging(format!("Failed to run {}: {}", argv[0], e)))?;

        if !output.status.success() {
            return Err(Error::Staging(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(key: Option<&str>) -> Target {
        Target {
            name: "box".to_string(),
            host: "example.com".to_string(),
            user: "dev".to_string(),
            port: 2200,
            key_files: key.map(PathBuf::from).into_iter().collect(),
        }
    }

    #[test]
    fn test_command_line() {
        let uploader = ScpUploader::default();
        let argv = uploader.command_line(
            PathBuf::from("/usr/bin/scp"),
            Path::new("/opt/codelite-remote"),
            "/tmp/codelite-remote",
            &target(Some("/keys/id")),
        );
        assert_eq!(
            argv,
            vec![
                "/usr/bin/scp",
                "-q",
                "-o",
                "StrictHostKeyChecking=no",
                "-P",
                "2200",
                "-i",
                "/keys/id",
                "/opt/codelite-remote",
                "dev@example.com:/tmp/codelite-remote",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_scp() {
        let uploader = ScpUploader::new("no-such-scp-binary-91c3", false);
        let err = uploader
            .upload(Path::new("/dev/null"), "/tmp/x", &target(None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutorNotFound(_)));
    }
}
