fn main() -> anyhow::Result<()> {
    nitrokit::cli::run_cli()
}
