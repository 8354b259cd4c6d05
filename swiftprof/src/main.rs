fn main() -> anyhow::Result<()> {
    swiftprof::cli::execute()
}
