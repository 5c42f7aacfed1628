use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const OUT_DIR: &str = "src/proto";
const PROTOS: &[&str] = &["proto/cast_channel.proto"];

const MOD: &[u8] = b"
pub use self::cast_channel::*;

mod cast_channel;
";

fn main() {
    for proto in PROTOS {
        println!("cargo:rerun-if-changed={}", proto);
    }
    fs::create_dir_all(OUT_DIR).expect("Failed to create proto output dir");

    protobuf_codegen_pure::Codegen::new()
        .out_dir(OUT_DIR)
        .inputs(PROTOS)
        .include("proto")
        .run()
        .expect("protoc");

    let dest_path = Path::new(OUT_DIR).join("mod.rs");
    let mut f = File::create(&dest_path).expect("Failed to create proto/mod.rs");
    f.write_all(MOD).expect("Failed to write proto/mod.rs");
}
