const TEST_RENDER_DIR: &str = "target/test-render";

/// Path for a scratch `.wav` a test can write to and read back, namespaced
/// by `label` so parallel tests don't collide.
pub fn scratch_wav_path(label: &str) -> String {
    std::fs::create_dir_all(TEST_RENDER_DIR).ok();
    format!("{TEST_RENDER_DIR}/{label}.wav")
}
