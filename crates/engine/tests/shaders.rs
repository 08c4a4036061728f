use engine::config::EngineConfig;
use engine::systems::simple_render_system::{FRAGMENT_SHADER, VERTEX_SHADER};
use std::fs::File;
use std::path::PathBuf;

const SPIRV_MAGIC: u32 = 0x0723_0203;
const OP_ENTRY_POINT: u32 = 15;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(EngineConfig::default().render.shader_dir)
}

fn load(name: &str) -> Vec<u32> {
    let path = shader_dir().join(name);
    let mut file = File::open(&path).unwrap_or_else(|err| panic!("{}: {err}", path.display()));
    ash::util::read_spv(&mut file).unwrap()
}

/// Execution model of every `OpEntryPoint` named "main".
fn main_entry_points(code: &[u32]) -> Vec<u32> {
    let main = u32::from_le_bytes(*b"main");
    let mut entry_points = Vec::new();
    let mut at = 5;
    while at < code.len() {
        let word_count = (code[at] >> 16) as usize;
        let opcode = code[at] & 0xffff;
        assert!(word_count > 0, "malformed instruction at word {at}");
        if opcode == OP_ENTRY_POINT && code[at + 3] == main {
            entry_points.push(code[at + 1]);
        }
        at += word_count;
    }
    assert_eq!(at, code.len(), "last instruction runs past the module");
    entry_points
}

#[test]
fn precompiled_shaders_are_spirv() {
    for name in [VERTEX_SHADER, FRAGMENT_SHADER] {
        let code = load(name);
        assert!(code.len() > 5, "{name} has no instructions");
        assert_eq!(code[0], SPIRV_MAGIC, "{name}");
        assert!(code[3] > 1, "{name} declares no ids");
    }
}

#[test]
fn shader_stages_match_their_files() {
    // Vertex = 0, Fragment = 4
    assert_eq!(main_entry_points(&load(VERTEX_SHADER)), vec![0]);
    assert_eq!(main_entry_points(&load(FRAGMENT_SHADER)), vec![4]);
}
