//! Skill installer (`seekdb install`).
//!
//! Copies packaged skill directories into the skills folder of an AI coding
//! tool inside a project (for example `.claude/skills/seekdb`). Prompts for
//! the project root, target tool, and skills unless they are given on the
//! command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect, Select};
use walkdir::WalkDir;

/// A supported AI tool and the project-relative folder it reads skills from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub skills_dir: &'static str,
}

pub const TOOLS: &[Tool] = &[
    Tool { name: "Claude Code", skills_dir: ".claude/skills" },
    Tool { name: "Cursor", skills_dir: ".cursor/skills" },
    Tool { name: "Codex", skills_dir: ".codex/skills" },
    Tool { name: "OpenCode", skills_dir: ".opencode/skills" },
    Tool { name: "GitHub Copilot", skills_dir: ".github/skills" },
    Tool { name: "Qoder", skills_dir: ".qoder/skills" },
    Tool { name: "Trae", skills_dir: ".trae/skills" },
];

/// `(name, description)` of every packaged skill.
pub const SKILLS: &[(&str, &str)] = &[
    ("seekdb", "seekdb documentation and usage guide"),
    ("importing-to-seekdb", "Import CSV/Excel files into seekdb collections"),
    ("querying-from-seekdb", "Query seekdb collections and export results"),
];

pub const DEFAULT_SKILL: &str = "seekdb";
pub const SKILLS_DIR_ENV: &str = "SEEKDB_SKILLS_DIR";

/// Parsed `seekdb install` arguments.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub project_root: Option<PathBuf>,
    pub skills_dir: Option<PathBuf>,
    pub tool: Option<String>,
    pub skills: Vec<String>,
    pub yes: bool,
}

/// Look up a tool by display name or by the first segment of its folder
/// (`claude`, `cursor`, ...), case-insensitively.
pub fn find_tool(name: &str) -> Option<Tool> {
    let wanted = name.to_lowercase();
    TOOLS.iter().copied().find(|tool| {
        let short = tool
            .skills_dir
            .trim_start_matches('.')
            .split('/')
            .next()
            .unwrap_or_default();
        tool.name.to_lowercase() == wanted || short == wanted
    })
}

/// Candidate directories holding the packaged skills, in lookup order.
pub fn skills_dir_candidates(explicit: Option<&Path>, env_dir: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = explicit {
        candidates.push(dir.to_path_buf());
    }
    if let Some(dir) = env_dir {
        candidates.push(dir);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join("skills"));
        candidates.push(exe_dir.join("..").join("share").join("seekdb-skills").join("skills"));
    }
    candidates.push(Path::new(env!("CARGO_MANIFEST_DIR")).join("skills"));
    candidates
}

pub fn resolve_skills_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let env_dir = std::env::var_os(SKILLS_DIR_ENV).map(PathBuf::from);
    let candidates = skills_dir_candidates(explicit, env_dir);
    match candidates.iter().find(|dir| dir.is_dir()) {
        Some(dir) => Ok(dir.clone()),
        None => bail!(
            "Skills directory not found. Searched: {:?}. Set {} or pass --skills-dir",
            candidates,
            SKILLS_DIR_ENV
        ),
    }
}

/// Copy `src` into `dest`, replacing whatever is already there.
pub fn copy_skill(src: &Path, dest: &Path) -> Result<usize> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .with_context(|| format!("failed to remove {}", dest.display()))?;
    }
    std::fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;

    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Result of installing a set of skills.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Install `skills` from `source` into `<project_root>/<tool.skills_dir>`.
/// Missing or failing skills are reported and do not stop the others.
pub fn install_skills(
    source: &Path,
    project_root: &Path,
    tool: Tool,
    skills: &[String],
) -> InstallReport {
    let target_root = project_root.join(tool.skills_dir);
    let mut report = InstallReport::default();
    for skill in skills {
        let src = source.join(skill);
        if !src.is_dir() {
            tracing::warn!("Skill '{}' not found in {}", skill, source.display());
            println!("  Skipped {}: not found in {}", skill, source.display());
            report.missing.push(skill.clone());
            continue;
        }
        let dest = target_root.join(skill);
        match copy_skill(&src, &dest) {
            Ok(files) => {
                println!("  Installed {} -> {} ({} files)", skill, dest.display(), files);
                report.installed.push(skill.clone());
            }
            Err(err) => {
                println!("  Failed to install {}: {:#}", skill, err);
                report.failed.push((skill.clone(), format!("{:#}", err)));
            }
        }
    }
    report
}

/// Run `seekdb install`. Cancelling any prompt returns `Ok(())`.
pub fn run_install(opts: &InstallOptions) -> Result<()> {
    let source = resolve_skills_dir(opts.skills_dir.as_deref())?;
    tracing::debug!(source = %source.display(), "Resolved skills directory");
    let theme = ColorfulTheme::default();

    let project_root = match &opts.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    if !opts.yes {
        let prompt = format!("Install skills into project root {}?", project_root.display());
        match Confirm::with_theme(&theme)
            .with_prompt(prompt)
            .default(true)
            .interact_opt()?
        {
            Some(true) => {}
            _ => return cancelled(),
        }
    }

    let tool = match &opts.tool {
        Some(name) => match find_tool(name) {
            Some(tool) => tool,
            None => bail!(
                "Unknown tool: {}. Choose one of: {}",
                name,
                TOOLS.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
            ),
        },
        None => {
            let items: Vec<String> = TOOLS
                .iter()
                .map(|t| format!("{} ({})", t.name, t.skills_dir))
                .collect();
            match Select::with_theme(&theme)
                .with_prompt("Select the AI tool to install skills for")
                .items(&items)
                .default(0)
                .interact_opt()?
            {
                Some(idx) => TOOLS[idx],
                None => return cancelled(),
            }
        }
    };

    let skills: Vec<String> = if !opts.skills.is_empty() {
        opts.skills.clone()
    } else if opts.yes {
        vec![DEFAULT_SKILL.to_string()]
    } else {
        let items: Vec<String> = SKILLS
            .iter()
            .map(|(name, desc)| format!("{} - {}", name, desc))
            .collect();
        let defaults: Vec<bool> = SKILLS.iter().map(|(name, _)| *name == DEFAULT_SKILL).collect();
        match MultiSelect::with_theme(&theme)
            .with_prompt("Select skills to install ([space] toggle, [enter] confirm)")
            .items(&items)
            .defaults(&defaults)
            .interact_opt()?
        {
            Some(selected) => selected.into_iter().map(|i| SKILLS[i].0.to_string()).collect(),
            None => return cancelled(),
        }
    };
    if skills.is_empty() {
        println!("No skills selected. Nothing to install.");
        return Ok(());
    }

    println!("\nInstallation summary:");
    println!("  Project root: {}", project_root.display());
    println!("  Tool:         {} ({})", tool.name, tool.skills_dir);
    println!("  Skills:       {}", skills.join(", "));
    println!();

    let report = install_skills(&source, &project_root, tool, &skills);
    println!(
        "\nDone: {} installed, {} skipped, {} failed.",
        report.installed.len(),
        report.missing.len(),
        report.failed.len()
    );
    Ok(())
}

fn cancelled() -> Result<()> {
    println!("Installation cancelled.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let skill = tmp.path().join("seekdb");
        std::fs::create_dir_all(skill.join("references")).unwrap();
        std::fs::write(skill.join("SKILL.md"), "---\nname: seekdb\n---\n").unwrap();
        std::fs::write(skill.join("references/catalog.jsonl"), "{}\n").unwrap();
        tmp
    }

    #[test]
    fn test_find_tool() {
        assert_eq!(find_tool("Claude Code").unwrap().skills_dir, ".claude/skills");
        assert_eq!(find_tool("cursor").unwrap().name, "Cursor");
        assert_eq!(find_tool("github").unwrap().name, "GitHub Copilot");
        assert!(find_tool("vim").is_none());
    }

    #[test]
    fn test_candidates_order() {
        let explicit = PathBuf::from("/opt/skills");
        let candidates = skills_dir_candidates(Some(&explicit), Some(PathBuf::from("/env/skills")));
        assert_eq!(candidates[0], explicit);
        assert_eq!(candidates[1], PathBuf::from("/env/skills"));
        assert!(candidates.last().unwrap().ends_with("skills"));
    }

    #[test]
    fn test_resolve_explicit_dir() {
        let tmp = source();
        assert_eq!(resolve_skills_dir(Some(tmp.path())).unwrap(), tmp.path());
    }

    #[test]
    fn test_copy_replaces_existing_target() {
        let src = source();
        let dest_root = TempDir::new().unwrap();
        let dest = dest_root.path().join(".claude/skills/seekdb");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.md"), "old").unwrap();

        let copied = copy_skill(&src.path().join("seekdb"), &dest).unwrap();
        assert_eq!(copied, 2);
        assert!(dest.join("SKILL.md").exists());
        assert!(dest.join("references/catalog.jsonl").exists());
        assert!(!dest.join("stale.md").exists());
    }

    #[test]
    fn test_install_skips_missing_skill() {
        let src = source();
        let project = TempDir::new().unwrap();
        let tool = find_tool("cursor").unwrap();
        let report = install_skills(
            src.path(),
            project.path(),
            tool,
            &["seekdb".to_string(), "querying-from-seekdb".to_string()],
        );
        assert_eq!(report.installed, vec!["seekdb"]);
        assert_eq!(report.missing, vec!["querying-from-seekdb"]);
        assert!(project.path().join(".cursor/skills/seekdb/SKILL.md").exists());
    }

    #[test]
    fn test_non_interactive_install() {
        let src = source();
        let project = TempDir::new().unwrap();
        let opts = InstallOptions {
            project_root: Some(project.path().to_path_buf()),
            skills_dir: Some(src.path().to_path_buf()),
            tool: Some("codex".to_string()),
            skills: vec![],
            yes: true,
        };
        run_install(&opts).unwrap();
        assert!(project.path().join(".codex/skills/seekdb/SKILL.md").exists());
    }
}
