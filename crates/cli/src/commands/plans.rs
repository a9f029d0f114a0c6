//! `keel plans`: saved plan files.

use keel_agent::{list_plans, read_plan};

pub fn run(id: Option<&str>) -> anyhow::Result<()> {
    let plans_dir = super::current_paths()?.plans_dir();

    if let Some(id) = id {
        let plan = read_plan(&plans_dir, id)
            .ok_or_else(|| anyhow::anyhow!("No plan '{id}' in {}", plans_dir.display()))?;
        println!("{plan}");
        return Ok(());
    }

    let ids = list_plans(&plans_dir);
    if ids.is_empty() {
        println!("   No plans in {}", plans_dir.display());
    }
    for id in ids {
        println!("  {id}");
    }
    Ok(())
}
