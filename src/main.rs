fn main() -> anyhow::Result<()> {
    roomcall_lib::run()
}
