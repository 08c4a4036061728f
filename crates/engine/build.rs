// Compiles the GLSL shaders in ../../shaders to SPIR-V next to their sources.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

fn main() {
    println!("cargo:rerun-if-changed=../../shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=PATH");

    if env::var("SKIP_SHADERS").is_ok() {
        println!("cargo:warning=SKIP_SHADERS set, shader compilation skipped");
        return;
    }

    let shader_dir = PathBuf::from("../../shaders");
    let Some(glslc) = find_glslc() else {
        let missing = missing_spirv(&shader_dir);
        if !missing.is_empty() {
            panic!(
                "glslc not found (set VULKAN_SDK or add glslc to PATH) and no SPIR-V for: {}",
                missing.join(", ")
            );
        }
        println!("cargo:warning=glslc not found, using the precompiled .spv files in shaders/");
        return;
    };

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            println!("cargo:warning=No shader directory at {}", shader_dir.display());
            return;
        }
    };

    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        if !is_shader_source(&path) {
            continue;
        }

        let out_file = spirv_path(&path);

        if is_up_to_date(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc)
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status()
            .unwrap_or_else(|err| panic!("Failed to run glslc for {}: {err}", path.display()));

        if !status.success() {
            panic!(
                "glslc failed for {} with exit code {}",
                path.display(),
                status.code().unwrap_or(-1)
            );
        }
    }
}

fn glslc_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "glslc.exe"
    } else {
        "glslc"
    }
}

/// `$VULKAN_SDK/bin/glslc` first, then the first `glslc` on `PATH`.
fn find_glslc() -> Option<PathBuf> {
    let from_sdk = env::var("VULKAN_SDK").ok().map(|sdk| {
        let bin = if cfg!(target_os = "windows") { "Bin" } else { "bin" };
        PathBuf::from(sdk).join(bin).join(glslc_name())
    });
    if let Some(glslc) = from_sdk.filter(|path| path.exists()) {
        return Some(glslc);
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(glslc_name()))
        .find(|candidate| candidate.is_file())
}

fn is_shader_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext))
}

fn spirv_path(source: &Path) -> PathBuf {
    // simple_shader.vert -> simple_shader.vert.spv
    let mut out_file = source.to_path_buf().into_os_string();
    out_file.push(".spv");
    PathBuf::from(out_file)
}

fn missing_spirv(shader_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(shader_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_shader_source(path) && !spirv_path(path).exists())
        .map(|path| path.display().to_string())
        .collect()
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(source), Some(output)) => output >= source,
        _ => false,
    }
}
