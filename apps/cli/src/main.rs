mod cli;
mod config;
mod main_lib;
mod notices;
mod render;

use anyhow::{anyhow, Context};
use clap::Parser;
use deedbook_core::deeds::{CopyOutcome, DeedField, Partition};
use deedbook_core::DeedTable;

use cli::{Cli, Command};
use config::Config;
use main_lib::{build_table, init_tracing, load_templates};
use render::{render_table, render_templates};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing();

    if let Command::Templates = cli.command {
        print!("{}", render_templates(&load_templates(&config)?));
        return Ok(());
    }

    let partition = Partition::new(cli.partition.clone().unwrap_or_else(|| config.partition.clone()));
    tracing::info!("Using table {}", partition);
    let table = build_table(&config, partition).await?;
    table.mount().await.context("Failed to load deeds")?;

    let result = run(&table, cli.command).await;
    // flushes edits still waiting for their quiet period
    table.unmount().await;
    result
}

async fn run(table: &DeedTable, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            print!("{}", render_table(&table.deeds(), table.templates()));
        }
        Command::Add => {
            let deed = table.add_deed().await?;
            println!("{}", deed.id);
        }
        Command::Delete { id } => {
            require_deed(table, &id)?;
            table.delete_deed(&id).await?;
        }
        Command::Set { id, field, value } => {
            require_deed(table, &id)?;
            let field: DeedField = field.parse()?;
            table.edit_field(&id, field, &value)?;
        }
        Command::SetExtra { id, key, value } => {
            require_deed(table, &id)?;
            table.edit_extra_field(&id, &key, &value)?;
        }
        Command::Copy { from } => match table.copy_from(&Partition::new(from)).await? {
            CopyOutcome::Copied(count) => println!("Copied {} deed(s)", count),
            CopyOutcome::SourceEmpty => println!("Nothing to copy"),
        },
        Command::Preview { id } => {
            let preview = table
                .preview(&id)
                .ok_or_else(|| anyhow!("No deed with id {}", id))?;
            println!("{}", preview);
        }
        Command::Watch => watch(table).await?,
        Command::Templates => print!("{}", render_templates(table.templates())),
    }
    Ok(())
}

fn require_deed(table: &DeedTable, id: &str) -> anyhow::Result<()> {
    match table.get(id) {
        Some(_) => Ok(()),
        None => Err(anyhow!("No deed with id {}", id)),
    }
}

async fn watch(table: &DeedTable) -> anyhow::Result<()> {
    let mut snapshots = table.subscribe();
    print!("{}", render_table(&snapshots.borrow_and_update(), table.templates()));

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let deeds = snapshots.borrow_and_update().clone();
                println!();
                print!("{}", render_table(&deeds, table.templates()));
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }
    Ok(())
}
