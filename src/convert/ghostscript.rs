//! Ghostscript bridge
//!
//! Runs Ghostscript's `pdfwrite` device to rewrite every color as sRGB.
//! Input and output are staged under fixed names in the staging
//! directory, so conversions are serialized.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::ColorConverter;
use crate::config::ConversionConfig;
use crate::error::{Result, SandboxError};

const INPUT_FILE: &str = "cmyk_input.pdf";
const OUTPUT_FILE: &str = "rgb_output.pdf";

const PDFWRITE_ARGS: [&str; 14] = [
    "-dBATCH",
    "-dNOPAUSE",
    "-dNOSAFER",
    "-dQUIET",
    "-sDEVICE=pdfwrite",
    "-sColorConversionStrategy=sRGB",
    "-sColorConversionStrategyForImages=sRGB",
    "-dConvertCMYKImagesToRGB=true",
    "-dProcessColorModel=/DeviceRGB",
    "-dAutoFilterColorImages=true",
    "-dAutoFilterGrayImages=true",
    "-dColorImageFilter=/DCTEncode",
    "-dGrayImageFilter=/DCTEncode",
    "-dCompatibilityLevel=1.4",
];

/// CMYK to sRGB conversion through a Ghostscript executable
pub struct GhostscriptBridge {
    config: ConversionConfig,
    lock: Mutex<()>,
}

impl GhostscriptBridge {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    fn arguments(input: &Path, output: &Path, source_profile: Option<&str>) -> Vec<OsString> {
        let mut args: Vec<OsString> = PDFWRITE_ARGS.iter().map(OsString::from).collect();
        if let Some(profile) = source_profile {
            args.push(format!("-sDefaultCMYKProfile={profile}").into());
        }
        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output);
        args.push(output_arg);
        args.push(input.into());
        args
    }

    async fn run(&self, pdf: &[u8], source_profile: Option<&str>, input: &Path, output: &Path) -> Result<Vec<u8>> {
        tokio::fs::write(input, pdf)
            .await
            .map_err(|e| SandboxError::ConversionEngine(format!("Failed to stage input: {e}")))?;

        let result = Command::new(&self.config.ghostscript)
            .args(Self::arguments(input, output, source_profile))
            .output()
            .await
            .map_err(|e| SandboxError::ConversionEngine(format!("Failed to run ghostscript: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SandboxError::ConversionEngine(format!(
                "Ghostscript exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        match tokio::fs::read(output).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(SandboxError::ConversionEngine(
                "Ghostscript did not produce an output file".to_string(),
            )),
        }
    }
}

async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staged file"),
    }
}

#[async_trait]
impl ColorConverter for GhostscriptBridge {
    async fn is_available(&self) -> bool {
        Command::new(&self.config.ghostscript)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn convert(&self, pdf: &[u8], source_profile: Option<&str>) -> Result<Vec<u8>> {
        let _staging = self.lock.lock().await;

        let dir = &self.config.staging_dir;
        tokio::fs::create_dir_all(dir).await?;
        let input = dir.join(INPUT_FILE);
        let output = dir.join(OUTPUT_FILE);

        debug!(size = pdf.len(), "Starting RGB conversion");
        let result = self.run(pdf, source_profile, &input, &output).await;

        remove_staged(&input).await;
        remove_staged(&output).await;

        match &result {
            Ok(bytes) => info!(input = pdf.len(), output = bytes.len(), "Converted document to RGB"),
            Err(e) => warn!(error = %e, "RGB conversion failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bridge(ghostscript: &Path, staging: &TempDir) -> GhostscriptBridge {
        GhostscriptBridge::new(ConversionConfig {
            ghostscript: ghostscript.to_path_buf(),
            staging_dir: staging.path().to_path_buf(),
        })
    }

    fn staged_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_arguments_end_with_output_and_input() {
        let args = GhostscriptBridge::arguments(Path::new("/s/in.pdf"), Path::new("/s/out.pdf"), None);
        assert_eq!(args[0], "-dBATCH");
        assert_eq!(args[4], "-sDEVICE=pdfwrite");
        assert_eq!(args[args.len() - 2], "-sOutputFile=/s/out.pdf");
        assert_eq!(args[args.len() - 1], "/s/in.pdf");

        let with_profile =
            GhostscriptBridge::arguments(Path::new("in"), Path::new("out"), Some("/icc/coated.icc"));
        assert!(with_profile.contains(&OsString::from("-sDefaultCMYKProfile=/icc/coated.icc")));
    }

    #[tokio::test]
    async fn test_missing_executable_cleans_up() {
        let staging = TempDir::new().unwrap();
        let bridge = bridge(Path::new("/nonexistent/gs-binary"), &staging);

        assert!(!bridge.is_available().await);
        let err = bridge.convert(b"%PDF-1.4", None).await.unwrap_err();
        assert!(matches!(err, SandboxError::ConversionEngine(_)));
        assert_eq!(staged_files(&staging), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_and_output_handling() {
        use std::os::unix::fs::PermissionsExt;

        let tools = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();

        // Copies the input to -sOutputFile, failing when the input says so
        let script = tools.path().join("fake-gs");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             out=\"\"\n\
             for arg in \"$@\"; do\n\
               case \"$arg\" in -sOutputFile=*) out=\"${arg#-sOutputFile=}\";; esac\n\
               last=\"$arg\"\n\
             done\n\
             if grep -q FAIL \"$last\"; then echo broken >&2; exit 3; fi\n\
             if grep -q EMPTY \"$last\"; then exit 0; fi\n\
             cp \"$last\" \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let bridge = bridge(&script, &staging);

        let converted = bridge.convert(b"%PDF-1.4 ok", None).await.unwrap();
        assert_eq!(converted, b"%PDF-1.4 ok");
        assert_eq!(staged_files(&staging), 0);

        let failed = bridge.convert(b"%PDF-1.4 FAIL", None).await.unwrap_err();
        assert!(failed.to_string().contains("broken"));
        assert_eq!(staged_files(&staging), 0);

        let missing = bridge.convert(b"%PDF-1.4 EMPTY", None).await.unwrap_err();
        assert!(matches!(missing, SandboxError::ConversionEngine(_)));
        assert_eq!(staged_files(&staging), 0);
    }
}
