//! Imports HIT definition XML files into the database.

use clap::Parser;
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use rankeval::MIGRATIONS;
use rankeval::hits::parse;
use rankeval::projects;

#[derive(Parser)]
pub struct ImportHits {
    /// HIT definition XML files (a `<hits>` document each).
    files: Vec<std::path::PathBuf>,
    /// Attach the imported HITs to this project (by name).
    #[clap(long)]
    project: Option<String>,
    /// Reserve the imported HITs for crowd workers.
    #[clap(long)]
    mturk_only: bool,
    /// Validate the input files without writing anything.
    #[clap(long)]
    dry_run: bool,
    #[clap(long)]
    database_url: Option<String>,
}

fn main() {
    tracing_subscriber::fmt().init();
    let args = ImportHits::parse();

    let db_url = if let Some(url) = args.database_url {
        url
    } else {
        std::env::var("DATABASE_URL").expect(
            "please either set `DATABASE_URL` or pass the `--database-url` flag",
        )
    };
    let mut conn = diesel::SqliteConnection::establish(&db_url).unwrap();
    conn.run_pending_migrations(MIGRATIONS).unwrap();

    let project_id = args.project.as_deref().map(|name| {
        projects::load_project_by_name(&mut conn, name)
            .unwrap_or_else(|| {
                projects::create_project(&mut conn, name).unwrap()
            })
            .id
    });

    let mut imported = 0usize;
    for file in &args.files {
        let xml = std::fs::read_to_string(file)
            .unwrap_or_else(|err| panic!("cannot read {file:?}: {err}"));
        if let Err(err) = parse::validate_hits_document(&xml) {
            eprintln!("{}: {err}", file.display());
            std::process::exit(1);
        }
        if args.dry_run {
            println!("{}: ok", file.display());
            continue;
        }

        let doc = roxmltree::Document::parse(&xml).unwrap();
        for hit_xml in doc
            .root_element()
            .children()
            .filter(|c| c.is_element())
            .map(|c| &xml[c.range()])
        {
            let hit = rankeval::hits::create_hit(
                &mut conn,
                hit_xml,
                args.mturk_only,
                project_id.as_deref(),
            )
            .unwrap();
            println!("imported HIT {} ({})", hit.id, hit.language_pair);
            imported += 1;
        }
    }
    if !args.dry_run {
        println!("imported {imported} HITs");
    }
}
