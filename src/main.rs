fn main() -> anyhow::Result<()> {
    // Load .env for TTS_BACKEND_URL and friends; absence is fine.
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("loaded environment from {:?}", path);
    }
    env_logger::init();

    let settings = aloud::Settings::from_env();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(aloud::server::serve(settings))
}
