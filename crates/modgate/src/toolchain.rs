use std::path::{Path, PathBuf};
use std::process::Command;

use modgate_wire::BuildMode;
use tracing::{debug, info};

/// Errors from the external build step.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The compiler binary could not be spawned at all.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    /// A compile step exited non-zero; diagnostics captured.
    #[error("{step} failed")]
    Compile {
        step: &'static str,
        stdout: String,
        stderr: String,
    },

    /// Reading or writing build inputs/outputs failed.
    #[error("build I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// The flow step this failure belongs to, for the response `step` field.
    pub fn step(&self) -> &'static str {
        match self {
            BuildError::Compile { step, .. } => step,
            _ => "build",
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Artifacts produced by one build invocation.
#[derive(Debug, Clone)]
pub struct BuildArtifacts {
    pub wasm_path: PathBuf,
    pub aot_path: Option<PathBuf>,
}

impl BuildArtifacts {
    /// The artifact that actually gets loaded onto the device.
    pub fn deploy_path(&self) -> &Path {
        self.aot_path.as_deref().unwrap_or(&self.wasm_path)
    }
}

/// Opaque external build step: C source in, loadable artifact out.
///
/// Kept behind a trait so the protocol flow is testable without any real
/// compiler on the machine.
pub trait Toolchain: Send + Sync {
    fn build(
        &self,
        source: &Path,
        mode: BuildMode,
        out_dir: &Path,
        module_id: &str,
    ) -> Result<BuildArtifacts>;
}

/// The clang/wamrc toolchain expected in PATH next to the gateway.
///
/// `wasm` mode compiles C straight to a portable module; `aot` mode runs
/// the extra wamrc ahead-of-time step for the target MCU.
#[derive(Debug, Clone)]
pub struct WamrToolchain {
    pub clang_bin: String,
    pub clang_target: String,
    pub wamrc_bin: String,
    pub wamrc_target: String,
}

impl Default for WamrToolchain {
    fn default() -> Self {
        Self {
            clang_bin: "clang".to_string(),
            clang_target: "wasm32-unknown-unknown".to_string(),
            wamrc_bin: "wamrc".to_string(),
            wamrc_target: "thumbv7em".to_string(),
        }
    }
}

impl WamrToolchain {
    fn compile_to_wasm(&self, source: &Path, out_wasm: &Path) -> Result<()> {
        let output = Command::new(&self.clang_bin)
            .arg(format!("--target={}", self.clang_target))
            .arg("-O3")
            .arg("-nostdlib")
            .arg("-Wl,--no-entry")
            .arg("-Wl,-z,stack-size=16384")
            .arg(source)
            .arg("-o")
            .arg(out_wasm)
            .output()
            .map_err(|source| BuildError::Spawn {
                tool: self.clang_bin.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Compile {
                step: "compile_wasm",
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        debug!(wasm = %out_wasm.display(), "compiled C source to wasm");
        Ok(())
    }

    fn compile_to_aot(&self, wasm: &Path, out_aot: &Path) -> Result<()> {
        let output = Command::new(&self.wamrc_bin)
            .arg(format!("--target={}", self.wamrc_target))
            .arg("--target-abi=eabi")
            .arg("-o")
            .arg(out_aot)
            .arg(wasm)
            .output()
            .map_err(|source| BuildError::Spawn {
                tool: self.wamrc_bin.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Compile {
                step: "compile_aot",
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        debug!(aot = %out_aot.display(), "compiled wasm module to aot");
        Ok(())
    }
}

impl Toolchain for WamrToolchain {
    fn build(
        &self,
        source: &Path,
        mode: BuildMode,
        out_dir: &Path,
        module_id: &str,
    ) -> Result<BuildArtifacts> {
        info!(module_id, mode = mode.as_str(), "building module");

        let wasm_path = out_dir.join(format!("{module_id}.wasm"));
        self.compile_to_wasm(source, &wasm_path)?;

        let aot_path = match mode {
            BuildMode::Wasm => None,
            BuildMode::Aot => {
                let aot_path = out_dir.join(format!("{module_id}.aot"));
                self.compile_to_aot(&wasm_path, &aot_path)?;
                Some(aot_path)
            }
        };

        Ok(BuildArtifacts {
            wasm_path,
            aot_path,
        })
    }
}
