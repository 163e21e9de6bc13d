#![no_main]

use lcovmerge_adapters_fs::MemorySourceReader;
use lcovmerge_app::{MergeEngine, MergeOptions};
use libfuzzer_sys::fuzz_target;

const SOURCE: &str = "int main(void)\n{\n  return 0;\n}\n";

fuzz_target!(|data: &[u8]| {
    // Errors are expected and acceptable; panics are not
    let sources = MemorySourceReader::new()
        .with_file("/a.c", SOURCE)
        .with_file("a.c", SOURCE);
    let mut engine = MergeEngine::new(MergeOptions::default(), sources);
    if engine.merge_text("fuzz.info", data).is_ok() {
        // Accepted input must render, and the rendering must parse without panicking
        let rendered = engine.render();
        let _ = engine.merge_text("rendered.info", rendered.as_bytes());
    }
});
