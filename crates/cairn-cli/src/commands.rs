use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use cairn_index::InMemoryIndexer;
use cairn_repo::{ListOptions, Repository, RepositoryConfig};
use cairn_store::FsStorage;
use cairn_types::{Document, Entity, EntityHandle, EntityKind, Folder, KindTag, PropertyValue, Site};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut repo = open_repository(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Ls(args) => cmd_ls(&repo, args, format),
        Command::Show(args) => cmd_show(&repo, args, format),
        Command::Create(args) => cmd_create(&mut repo, args),
        Command::Rm(args) => cmd_rm(&mut repo, args),
        Command::Mv(args) => cmd_mv(&mut repo, args),
        Command::Cp(args) => cmd_cp(&mut repo, args),
        Command::Resource(args) => cmd_resource(&mut repo, args, format),
        Command::Fsck(args) => cmd_fsck(&repo, args, format),
        Command::Search(args) => cmd_search(&repo, args, format),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RepositoryConfig> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = cli.root.join("cairn.toml");
            default.exists().then_some(default)
        }
    };
    let Some(path) = path else {
        return Ok(RepositoryConfig::default());
    };
    debug!(path = %path.display(), "loading configuration");
    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok(RepositoryConfig::from_toml_str(&text)?)
}

fn open_repository(cli: &Cli) -> anyhow::Result<Repository> {
    let config = load_config(cli)?;
    let storage = FsStorage::open(&cli.root)
        .with_context(|| format!("cannot open storage at {}", cli.root.display()))?;
    let mut repo = Repository::builder(Arc::new(storage)).config(config).build()?;
    if let Some(actor) = &cli.actor {
        repo.set_actor(Some(actor.clone()));
    }
    Ok(repo)
}

fn summary(handle: &EntityHandle) -> serde_json::Value {
    let entity = handle.read();
    json!({
        "path": entity.path(),
        "uuid": entity.uuid,
        "kind": entity.kind_tag().as_str(),
        "title": entity.title(),
    })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ls(repo: &Repository, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let options = ListOptions {
        kind: args.kind.as_deref().map(str::parse::<KindTag>).transpose()?,
        deep: args.deep,
        ignore_errors: args.ignore_errors,
    };
    let children = repo.get_children(&args.path, &options)?;
    if format == OutputFormat::Json {
        return print_json(&children.iter().map(summary).collect());
    }
    if children.is_empty() {
        println!("No entities below {}.", args.path.bold());
    }
    for handle in &children {
        let entity = handle.read();
        println!(
            "{:<40} {:<9} {}",
            entity.path().unwrap_or_default().bold(),
            entity.kind_tag().as_str().cyan(),
            entity.title().unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_show(repo: &Repository, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let handle = repo.get_entity(&args.path)?;
    let resources = repo.list_resources(&handle)?;
    let entity = handle.snapshot();
    if format == OutputFormat::Json {
        let mut value = serde_json::to_value(&entity)?;
        value["path"] = json!(entity.path());
        value["resources"] = json!(resources);
        return print_json(&value);
    }

    println!("{}  {}", entity.path().unwrap_or_default().bold(), entity.kind_tag().as_str().cyan());
    if let Some(title) = entity.title() {
        println!("  Title:    {title}");
    }
    if let Some(uuid) = entity.uuid {
        println!("  UUID:     {}", uuid.to_string().yellow());
    }
    if let Some(created) = entity.created {
        println!("  Created:  {created} by {}", entity.created_by.as_deref().unwrap_or("-"));
    }
    if let Some(modified) = entity.modified {
        println!("  Modified: {modified} by {}", entity.modified_by.as_deref().unwrap_or("-"));
    }
    for (key, value) in &entity.properties {
        println!("  {} = {value}", key.dimmed());
    }
    for name in &resources {
        println!("  {} {name}", "resource".blue());
    }
    Ok(())
}

fn parse_property(raw: &str) -> anyhow::Result<(String, PropertyValue)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("property {raw:?} is not key=value");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("property {raw:?} has an empty key");
    }
    let value = if let Ok(i) = value.parse::<i64>() {
        PropertyValue::Int(i)
    } else if let Ok(b) = value.parse::<bool>() {
        PropertyValue::Bool(b)
    } else {
        PropertyValue::Text(value.to_string())
    };
    Ok((key.to_string(), value))
}

fn new_kind(tag: KindTag, title: String) -> EntityKind {
    match tag {
        KindTag::Generic => EntityKind::Generic,
        KindTag::Folder => EntityKind::Folder(Folder::new(title)),
        KindTag::Document => EntityKind::Document(Document::new(title)),
        KindTag::Site => EntityKind::Site(Site::new(title)),
    }
}

fn cmd_create(repo: &mut Repository, args: CreateArgs) -> anyhow::Result<()> {
    let path = repo.path_builder().sanitize(&args.path);
    if repo.has_entity(&path)? {
        bail!("an entity already exists at {path}");
    }
    let tag: KindTag = args.kind.parse()?;
    let title = args.title.unwrap_or_else(|| {
        repo.path_builder().name(&path).unwrap_or_default().to_string()
    });
    let mut entity = Entity::new(new_kind(tag, title)).with_path(path.as_str());
    for raw in &args.props {
        let (key, value) = parse_property(raw)?;
        entity.set_property(key, value);
    }

    let handle = EntityHandle::new(entity);
    repo.save_entity(&handle)?;
    repo.commit()?;
    let uuid = handle.uuid().map(|u| u.to_string()).unwrap_or_default();
    println!("{} Created {} {}", "✓".green().bold(), path.bold(), uuid.yellow());
    Ok(())
}

fn cmd_rm(repo: &mut Repository, args: RmArgs) -> anyhow::Result<()> {
    let handle = repo.get_entity(&args.path)?;
    repo.delete_entity(&handle)?;
    let diff = repo.commit()?;
    println!(
        "{} Deleted {} ({} entities)",
        "✓".green().bold(),
        args.path.bold(),
        diff.removed_entities.len()
    );
    Ok(())
}

fn cmd_mv(repo: &mut Repository, args: MvArgs) -> anyhow::Result<()> {
    let handle = repo.get_entity(&args.from)?;
    let moved = repo.move_entity(&handle, &args.to)?;
    println!(
        "{} Moved {} → {}",
        "✓".green().bold(),
        args.from.bold(),
        moved.path().unwrap_or_default().bold()
    );
    Ok(())
}

fn cmd_cp(repo: &mut Repository, args: CpArgs) -> anyhow::Result<()> {
    let handle = repo.get_entity(&args.from)?;
    let copy = repo.copy_entity(&handle, &args.to)?;
    println!(
        "{} Copied {} → {}",
        "✓".green().bold(),
        args.from.bold(),
        copy.path().unwrap_or_default().bold()
    );
    Ok(())
}

fn cmd_resource(repo: &mut Repository, args: ResourceArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.action {
        ResourceAction::Put { entity, name, file } => {
            let handle = repo.get_entity(&entity)?;
            let reader = File::open(&file).with_context(|| format!("cannot open {}", file.display()))?;
            repo.write_resource(&handle, &name, reader)?;
            let diff = repo.commit()?;
            let size = diff.saved_resources.first().map(|r| r.size).unwrap_or(0);
            println!("{} Stored {}/{} ({size} bytes)", "✓".green().bold(), entity.bold(), name);
        }
        ResourceAction::Get { entity, name, out } => {
            let handle = repo.get_entity(&entity)?;
            let mut reader = repo.read_resource(&handle, &name)?;
            write_out(&mut reader, out)?;
        }
        ResourceAction::Ls { entity } => {
            let handle = repo.get_entity(&entity)?;
            let names = repo.list_resources(&handle)?;
            if format == OutputFormat::Json {
                return print_json(&json!(names));
            }
            for name in names {
                println!("{name}");
            }
        }
        ResourceAction::Rm { entity, name } => {
            let handle = repo.get_entity(&entity)?;
            if !repo.has_resource(&handle, &name)? {
                bail!("no resource {name} on {entity}");
            }
            repo.delete_resource(&handle, &name)?;
            repo.commit()?;
            println!("{} Deleted {}/{}", "✓".green().bold(), entity.bold(), name);
        }
    }
    Ok(())
}

fn write_out(reader: &mut dyn io::Read, out: Option<PathBuf>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            let mut file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
            io::copy(reader, &mut file)?;
            file.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            io::copy(reader, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}

fn cmd_fsck(repo: &Repository, args: FsckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let audit = repo.find_duplicate_uuids(&args.path)?;
    if format == OutputFormat::Json {
        return print_json(&json!({
            "scanned": audit.scanned,
            "duplicates": audit.duplicates,
            "missing_uuid": audit.missing,
            "unreadable": audit
                .unreadable
                .iter()
                .map(|(path, e)| json!({ "path": path, "error": e.to_string() }))
                .collect::<Vec<_>>(),
        }));
    }

    for (uuid, paths) in &audit.duplicates {
        println!("{} uuid {} shared by {}", "✗".red().bold(), uuid.to_string().yellow(), paths.join(", "));
    }
    for path in &audit.missing {
        println!("{} {} has no uuid", "✗".red().bold(), path);
    }
    for (path, e) in &audit.unreadable {
        println!("{} {}: {e}", "✗".red().bold(), path);
    }
    if audit.is_clean() {
        println!("{} {} entities, no issues.", "✓".green().bold(), audit.scanned);
        Ok(())
    } else {
        bail!("fsck found problems")
    }
}

fn cmd_search(repo: &Repository, args: SearchArgs, format: OutputFormat) -> anyhow::Result<()> {
    let indexer = InMemoryIndexer::new();
    let report = repo.reindex(&args.under, &indexer)?;
    debug!(indexed = report.indexed, "search index built");
    let hits = indexer.search(&args.query);
    if format == OutputFormat::Json {
        return print_json(&json!(hits
            .iter()
            .map(|h| json!({ "path": h.path, "score": h.score }))
            .collect::<Vec<_>>()));
    }
    if hits.is_empty() {
        println!("No matches.");
    }
    for hit in hits {
        println!("{:>4}  {}", hit.score.to_string().dimmed(), hit.path.bold());
    }
    Ok(())
}
