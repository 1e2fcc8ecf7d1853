// Entry point and high-level CLI flow.
//
// One-shot mode renders the selected pages once and optionally exports them.
// Interactive mode is a numbered menu: every selection replaces the previous
// value for that filter and the dashboard is re-rendered from scratch.
mod aggregate;
mod chart;
mod config;
mod error;
mod geo;
mod loader;
mod output;
mod types;
mod util;
mod view;

use clap::Parser;
use config::Args;
use loader::{producing_districts, Session};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::error;
use types::ClusterKind;
use view::{Filters, GrowthScope, Page, SectorChoice, YearSelection};

/// Print a prompt and read one trimmed line. `None` on end of input.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_choice() -> Option<String> {
    read_line("Enter choice: ")
}

/// Render, print and run the requested exports. Export failures are logged
/// and reported back so one-shot mode can exit non-zero.
fn show(session: &Session, filters: &Filters, args: &Args) -> bool {
    let dataset = session.dataset();
    let view = view::render(filters, dataset, session.locations());
    output::print_view(&view, args.preview_rows);

    let mut ok = true;
    if let Some(dir) = &args.export_csv {
        match output::export_tables(dir, &view) {
            Ok(paths) => {
                for p in paths {
                    println!("(Table exported to {})", p.display());
                }
            }
            Err(e) => {
                error!(error = %e, "csv export failed");
                eprintln!("Write error: {}", e);
                ok = false;
            }
        }
    }
    if let Some(path) = &args.export_json {
        match output::write_json(path, &view) {
            Ok(()) => println!("(View exported to {})", path.display()),
            Err(e) => {
                error!(error = %e, "json export failed");
                eprintln!("Write error: {}", e);
                ok = false;
            }
        }
    }
    ok
}

fn select_pages(filters: &mut Filters) {
    println!("Select pages (comma separated, empty for none):");
    for (i, page) in Page::ALL.iter().enumerate() {
        println!("[{}] {}", i + 1, page.title());
    }
    let Some(line) = read_choice() else { return };
    let mut pages = Vec::new();
    for part in line.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<usize>().ok().and_then(|i| Page::ALL.get(i.wrapping_sub(1))) {
            Some(page) if !pages.contains(page) => pages.push(*page),
            Some(_) => {}
            None => println!("Ignoring invalid page '{}'.", part),
        }
    }
    filters.pages = pages;
}

fn select_year(filters: &mut Filters, years: &[i32]) {
    let listed: Vec<String> = years.iter().map(|y| y.to_string()).collect();
    println!("Available years: {} (or 'all')", listed.join(", "));
    let Some(line) = read_choice() else { return };
    match line.parse::<YearSelection>() {
        Ok(year) => filters.year = year,
        Err(e) => println!("{}", e),
    }
}

fn select_districts(filters: &mut Filters, choices: &[String]) {
    println!("Select districts (comma separated numbers, empty for none):");
    for (i, d) in choices.iter().enumerate() {
        println!("[{}] {}", i + 1, d);
    }
    let Some(line) = read_choice() else { return };
    filters.districts = line
        .split(',')
        .filter_map(|p| p.trim().parse::<usize>().ok())
        .filter_map(|i| choices.get(i.wrapping_sub(1)).cloned())
        .collect();
}

fn select_sector(filters: &mut Filters) {
    println!("[1] Smallholder\n[2] Private Estate\n[3] Both");
    match read_choice().as_deref() {
        Some("1") => filters.sector = SectorChoice::Smallholder,
        Some("2") => filters.sector = SectorChoice::Private,
        Some("3") => filters.sector = SectorChoice::Both,
        _ => println!("Invalid choice. Please enter 1, 2 or 3."),
    }
}

fn select_growth_scope(filters: &mut Filters) {
    println!("[1] Top 5 districts\n[2] All districts");
    match read_choice().as_deref() {
        Some("1") => filters.growth_scope = GrowthScope::Top(5),
        Some("2") => filters.growth_scope = GrowthScope::All,
        _ => println!("Invalid choice. Please enter 1 or 2."),
    }
}

fn select_cluster(filters: &mut Filters) {
    println!("[1] Productivity clusters\n[2] Production clusters");
    match read_choice().as_deref() {
        Some("1") => filters.cluster = ClusterKind::Productivity,
        Some("2") => filters.cluster = ClusterKind::Production,
        _ => println!("Invalid choice. Please enter 1 or 2."),
    }
}

fn interactive(session: &Session, args: &Args) {
    let dataset = session.dataset();
    let mut filters = args.filters(dataset);
    let years = dataset.years();
    let districts = producing_districts(&dataset.observations);
    show(session, &filters, args);

    loop {
        println!("Tea Plantation Dashboard");
        println!("[1] Pages");
        println!("[2] Year");
        println!("[3] Districts");
        println!("[4] Sector");
        println!("[5] Growth scope");
        println!("[6] Cluster labels");
        println!("[7] Redraw");
        println!("[0] Exit\n");
        let Some(choice) = read_choice() else { break };
        match choice.as_str() {
            "1" => select_pages(&mut filters),
            "2" => select_year(&mut filters, &years),
            "3" => select_districts(&mut filters, &districts),
            "4" => select_sector(&mut filters),
            "5" => select_growth_scope(&mut filters),
            "6" => select_cluster(&mut filters),
            "7" => {}
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => {
                println!("Invalid choice. Please enter 0-7.\n");
                continue;
            }
        }
        println!();
        show(session, &filters, args);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    config::init_logging(&args.log_level);

    let session = Session::new(args.data.clone(), args.locations.clone());
    output::print_load_summary(session.dataset());
    if args.interactive {
        interactive(&session, &args);
        return ExitCode::SUCCESS;
    }

    let filters = args.filters(session.dataset());
    if show(&session, &filters, &args) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
