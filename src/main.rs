fn main() -> anyhow::Result<()> {
    pdf_brain_lib::run()
}
