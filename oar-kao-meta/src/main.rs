mod meta_schedule;
mod platform;
mod queues_schedule;

use dotenvy::dotenv;
use log::{error, info, LevelFilter};
use oar_kao_core::auto_bench_fct::{print_bench_fct_hy_results, print_bench_fct_results};
use oar_kao_core::model::configuration::Configuration;
use oar_kao_core::model::job::Allocation;
use oar_kao_core::model::resource::ResourceIdMap;
use oar_kao_core::platform::PlatformTrait;
use platform::Platform;
use prettytable::{format, row, Table};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Load .env file if present
    dotenv().ok();

    // Initialize logging
    env_logger::Builder::new()
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    // Load configuration
    let config = match Configuration::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(snapshot_path) = std::env::args().nth(1) else {
        error!("Usage: oar-kao-meta <snapshot.json>");
        return ExitCode::from(2);
    };

    // Create the platform instance
    let mut platform = match Platform::from_file(&snapshot_path, config) {
        Ok(platform) => platform,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // Meta scheduling
    let round = meta_schedule::meta_schedule(&mut platform);
    info!(
        "{} jobs scheduled, {} jobs still waiting, {} slots.",
        round.allocations.len(),
        platform.waiting_job_ids().len(),
        round.slot_count
    );

    allocations_table(&round.allocations, &platform.get_platform_config().resource_set.id_map).printstd();
    print_bench_fct_results();
    print_bench_fct_hy_results();
    ExitCode::SUCCESS
}

fn allocations_table(allocations: &[Allocation], id_map: &ResourceIdMap) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.add_row(row![buFc->"Job", buFc->"Moldable", buFc->"Begin", buFc->"End", buFc->"Resources"]);
    for allocation in allocations {
        let resources = allocation
            .external_resources(id_map)
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        table.add_row(row![allocation.job_id, allocation.moldable_id, allocation.begin, allocation.end, resources]);
    }
    table
}
