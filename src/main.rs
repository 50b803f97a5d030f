// Reads browser events as newline-delimited JSON on stdin.
fn main() -> anyhow::Result<()> {
    wyd_lib::run()
}
