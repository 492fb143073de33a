//! Connectivity check.

use console::style;

use vidstats::StatsService;

/// Open the pool and report its state.
pub async fn cmd_check(service: &StatsService) -> anyhow::Result<()> {
    let contract = service.contract();
    println!(
        "{} Schema contract {} ({})",
        style("•").cyan(),
        contract.version(),
        contract.short_fingerprint()
    );

    if let Err(e) = service.initialize().await {
        println!("{} Database unavailable: {}", style("✗").red(), e);
        return Err(e.into());
    }

    if let Some(status) = service.pool_status() {
        println!(
            "{} Database pool {}: {} open, {} idle, {} in use (max {})",
            style("✓").green(),
            service.state(),
            status.size,
            status.available,
            status.in_use,
            status.max_size
        );
    }

    service.close();
    Ok(())
}
