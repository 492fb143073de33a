//! Schema contract display.

use console::style;

use vidstats::SchemaContract;

pub fn cmd_schema(short: bool) -> anyhow::Result<()> {
    let contract = SchemaContract::builtin();
    if !short {
        println!("{}\n", contract.system_prompt());
    }
    println!(
        "{} {}",
        style(format!("contract {}", contract.version())).bold(),
        contract.fingerprint()
    );
    Ok(())
}
