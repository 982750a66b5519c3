// export.rs — Print the effective merged policy.

use gov_diagnostics::{export_json, export_text};

use super::{report_problems, Context};

pub async fn execute(ctx: &Context) -> anyhow::Result<()> {
    let (engine, summary) = ctx.load_engine().await;
    report_problems(&summary);
    if ctx.json {
        println!("{}", export_json(&engine)?);
    } else {
        print!("{}", export_text(&engine));
    }
    Ok(())
}
