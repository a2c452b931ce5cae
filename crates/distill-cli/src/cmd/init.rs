use anyhow::Context;
use distill_core::{config::Config, io, paths, ruleset};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    println!("Initializing distill in: {}", root.display());

    let dir = paths::distill_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    let cfg = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load config")?
    } else {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let incidents = paths::incidents_dir(root, &cfg.store.incidents_dir);
    if incidents.is_dir() {
        println!("  exists:  {}/", cfg.store.incidents_dir);
    } else {
        io::ensure_dir(&incidents)
            .with_context(|| format!("failed to create {}", incidents.display()))?;
        println!("  created: {}/", cfg.store.incidents_dir);
    }

    let rules = paths::rules_path(root, &cfg.store.rules_file);
    if rules.exists() {
        // Parse so a hand-edited document is caught now, not at commit time.
        let current = ruleset::load(root, &cfg)
            .with_context(|| format!("failed to parse {}", rules.display()))?;
        println!(
            "  exists:  {} (revision {}, {} lines)",
            cfg.store.rules_file,
            current.revision,
            current.line_count()
        );
    } else {
        ruleset::save(root, &cfg, &ruleset::Ruleset::default())
            .with_context(|| format!("failed to write {}", rules.display()))?;
        println!("  created: {}", cfg.store.rules_file);
    }

    println!("\ndistill initialized for '{}'.", cfg.project.name);
    println!("Next: distill incident create --title \"...\" --severity high --root-cause \"...\"");
    Ok(())
}
