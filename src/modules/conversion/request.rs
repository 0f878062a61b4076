//! Typed conversion requests and their rendering into engine command lines.
//!
//! Orchestration never builds argv or scripts by hand; it hands a
//! [`ConversionRequest`] to an [`Engine`] and runs whatever comes back.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Exit code the toolkit script uses when the import produced no objects.
pub const EMPTY_IMPORT_EXIT_CODE: i32 = 3;

/// Marker line printed by the toolkit script for an empty import.
pub const EMPTY_IMPORT_MARKER: &str = "No objects imported";

/// One-shot toolkit script. Paths arrive through argv after `--`, so no path
/// ever has to be quoted into the script body.
const BLENDER_SCRIPT: &str = r#"import sys
import time
import traceback

import bpy

start = time.time()


def log(message):
    print(f"[{time.time() - start:.1f}s] {message}", flush=True)


argv = sys.argv[sys.argv.index("--") + 1:]
scene_file, glb_file = argv[0], argv[1]

try:
    bpy.ops.wm.read_factory_settings(use_empty=True)

    log(f"Importing USD: {scene_file}")
    bpy.ops.wm.usd_import(filepath=scene_file)

    count = len(bpy.data.objects)
    if count == 0:
        log("ERROR: No objects imported from USD")
        sys.exit(3)

    log(f"Imported {count} objects")
    log(f"Exporting GLB: {glb_file}")
    bpy.ops.export_scene.gltf(filepath=glb_file, export_format="GLB")

    log("SUCCESS: Conversion complete")
    sys.exit(0)
except Exception as exc:
    log(f"ERROR: {exc}")
    traceback.print_exc()
    sys.exit(1)
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Full 3D toolkit driven by a generated import/export script.
    Blender,
    /// Opaque command-line transcoder fed the container directly.
    GltfTransform,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blender" => Ok(EngineKind::Blender),
            "gltf-transform" | "gltf_transform" | "cli" => Ok(EngineKind::GltfTransform),
            other => Err(format!("unknown converter engine: {other}")),
        }
    }
}

/// What to convert and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Scene file (toolkit) or the whole container (CLI transcoder).
    pub source: PathBuf,
    pub output: PathBuf,
}

/// A ready-to-spawn command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub kind: EngineKind,
    pub binary: PathBuf,
}

impl Engine {
    pub fn new(kind: EngineKind, binary: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            binary: binary.into(),
        }
    }

    /// Whether the container must be unpacked and a scene file located first.
    pub fn needs_scene_file(&self) -> bool {
        matches!(self.kind, EngineKind::Blender)
    }

    /// Renders `request` into a command line. The toolkit variant writes its
    /// script into `scratch`, which the caller owns and removes.
    pub fn render(&self, request: &ConversionRequest, scratch: &Path) -> io::Result<EngineInvocation> {
        match self.kind {
            EngineKind::Blender => {
                let script = scratch.join(format!("convert_{}.py", Uuid::new_v4().simple()));
                std::fs::write(&script, BLENDER_SCRIPT)?;

                Ok(EngineInvocation {
                    program: self.binary.clone(),
                    args: vec![
                        "--background".into(),
                        "--python".into(),
                        script.into_os_string(),
                        "--".into(),
                        request.source.clone().into_os_string(),
                        request.output.clone().into_os_string(),
                    ],
                })
            }
            EngineKind::GltfTransform => Ok(EngineInvocation {
                program: self.binary.clone(),
                args: vec![
                    "copy".into(),
                    request.source.clone().into_os_string(),
                    request.output.clone().into_os_string(),
                ],
            }),
        }
    }
}
