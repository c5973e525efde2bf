mod cache;
mod cli;
mod command;
mod entity;
mod link;
mod metric;
mod prelude;
mod resolver;
mod snapshot;
mod tables;

use std::time::Duration;

use clap::{Parser, crate_version};
use itertools::Itertools;

use crate::{
    cli::{Args, Command, EngineArgs},
    entity::{ExposedValueSet, OnOffControl, PowerLimitControl},
    link::ModbusDeviceLink,
    prelude::*,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "Starting…");

    match Args::parse().command {
        Command::Watch(args) => {
            let mut set = try_new_value_set(&args.engine).await?;
            let read_interval = Duration::from_secs(args.read_interval_secs);
            loop {
                print_readings(&set.read_all().await, args.json)?;
                tokio::time::sleep(read_interval).await;
            }
        }

        Command::Fetch(args) => {
            let mut set = try_new_value_set(&args.engine).await?;
            print_readings(&set.read_all().await, args.json)?;
            Ok(())
        }

        Command::SetPowerLimit(args) => {
            let link = new_link(&args.dtu, 0);
            let mut control = PowerLimitControl::new(link, args.inverter.validated()?);
            control.write(args.percent).await.context("failed to set the power limit")?;
            info!(requested = control.last_requested(), "done");
            Ok(())
        }

        Command::SetPower(args) => {
            let link = new_link(&args.dtu, 0);
            let mut control = OnOffControl::new(link, args.inverter.validated()?);
            control.write(args.state.is_on()).await.context("failed to switch the inverter")?;
            info!(requested = control.last_requested(), "done");
            Ok(())
        }
    }
}

fn new_link(args: &cli::DtuArgs, panel_count: usize) -> ModbusDeviceLink {
    ModbusDeviceLink::builder()
        .address(args.address.clone())
        .unit_id(args.unit_id)
        .panel_count(panel_count)
        .build()
}

async fn try_new_value_set(args: &EngineArgs) -> Result<ExposedValueSet<ModbusDeviceLink>> {
    info!(
        plant_metrics = args.plant_metrics().iter().map(|metric| metric.descriptor().name).join(","),
        pv_metrics = args.pv_metrics().iter().map(|metric| metric.descriptor().name).join(","),
        "enabled metrics",
    );
    let link = new_link(&args.dtu, args.plant.panel_count);
    ExposedValueSet::try_new(
        link,
        Duration::from_secs(args.min_poll_interval_secs),
        &args.plant.name,
        args.plant.panel_count,
        args.plant_metrics(),
        args.pv_metrics(),
    )
    .await
    .context("failed to start the telemetry engine")
}

fn print_readings(readings: &[entity::Reading], json: bool) -> Result {
    if json {
        println!("{}", serde_json::to_string_pretty(readings)?);
    } else {
        println!("{}", tables::build_readings_table(readings));
    }
    Ok(())
}
