//! radio simulation for meshmac

use anyhow::Result;
use colored::Colorize;
use indicatif::ProgressBar;
use meshmac_radio::MacConfig;
use meshmac_sim::{scenarios, ScenarioReport, SimulationConfig, SimulationPresets};

const SEED: u64 = 2024;

fn run_scenarios(name: &str, mac: &MacConfig) -> Result<Vec<ScenarioReport>> {
    let config = SimulationConfig {
        mac: mac.clone(),
        seed: SEED,
        max_ticks: 50_000,
    };
    let storm = SimulationConfig {
        max_ticks: 5_000,
        ..config.clone()
    };

    log::info!("Running scenarios under the {} preset", name);
    Ok(vec![
        scenarios::point_to_point(&config, 10)?,
        scenarios::hidden_terminal(&config, 5)?,
        scenarios::broadcast_storm(&storm, 8, 100)?,
        scenarios::convergecast(&config, 10, 10, 0.62, 2.0)?,
    ])
}

fn print_report(report: &ScenarioReport) {
    let ratio = format!("{:.0}%", report.delivery_ratio() * 100.0);
    let ratio = if report.is_complete() {
        ratio.bright_green()
    } else {
        ratio.bright_yellow()
    };
    println!(
        "  {:<16} {:>5}/{:<5} {:>5}  ticks {:>6}  tx {:>5}  retx {:>4}  collisions {:>5}",
        report.name,
        report.delivered,
        report.expected,
        ratio,
        report.sim.ticks,
        report.sim.mac.transmissions,
        report.sim.mac.retransmissions,
        report.sim.medium.collisions,
    );
}

fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "meshmac Radio Simulation".bright_blue().bold());
    println!("{}", "========================".bright_blue());
    println!();

    let presets = SimulationPresets::all();
    let progress = ProgressBar::new(presets.len() as u64);
    let mut results = Vec::new();
    for (name, mac) in &presets {
        progress.set_message(*name);
        results.push((*name, mac.clone(), run_scenarios(name, mac)?));
        progress.inc(1);
    }
    progress.finish_and_clear();

    for (name, mac, reports) in results {
        println!("{}", format!(">>> {name}").bright_green().bold());
        println!("Contention window: {}", mac.contention_window);
        println!("ACK wait: {} ticks", mac.ack_wait);
        println!("Persistence: {}", mac.persistence);
        for report in &reports {
            print_report(report);
        }
        println!("{}", "-".repeat(50));
    }

    println!("\n{}", "All simulations complete!".bright_green().bold());
    Ok(())
}
