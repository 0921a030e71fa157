//! Tag and untag commands - edit the identity attribute on files
//!
//! `tag` creates identities and edits names; `untag` strips names or removes
//! the attribute. Both plan the edit from the current value first, so a
//! dry-run prints exactly what a real run would write.

use crate::cli::error::HelpfulError;
use crate::cli::CliContext;
use std::path::{Path, PathBuf};
use tagsync::tag::{self, Tag};
use tagsync::AttributeStore;
use tracing::warn;

/// Arguments for the tag command
#[derive(Debug)]
pub struct TagArgs {
    pub paths: Vec<PathBuf>,
    /// Raw `-n` values; each may hold several comma/semicolon separated names
    pub add: Vec<String>,
    /// Raw `-x` values
    pub remove: Vec<String>,
    pub remove_all_names: bool,
    pub remove_tag: bool,
}

/// Arguments for the untag command
#[derive(Debug)]
pub struct UntagArgs {
    pub paths: Vec<PathBuf>,
    pub names: Vec<String>,
    pub nuke_names: bool,
}

/// A requested change to one object's tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEdit {
    /// Create a tag if missing, then append these names
    AddNames(Vec<String>),
    RemoveNames(Vec<String>),
    ClearNames,
    RemoveTag,
}

/// What applying a [`TagEdit`] to a current value amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPlan {
    Create(String),
    Rewrite { old: String, new: String },
    Unchanged(String),
    RemoveAttribute(String),
    Skip(String),
}

/// Decide the new attribute value without touching the filesystem.
pub fn plan_edit(current: Option<&str>, edit: &TagEdit) -> EditPlan {
    let current = current.filter(|v| !v.is_empty());

    let existing = match current.map(tag::decode) {
        None => None,
        Some(Ok(Some(tag))) => Some(tag),
        Some(Ok(None)) => {
            return EditPlan::Skip("attribute holds a value that is not a TagSync tag".to_string())
        }
        Some(Err(err)) => return EditPlan::Skip(format!("invalid tag format ({err})")),
    };

    let Some(mut tag) = existing else {
        return match edit {
            TagEdit::AddNames(names) => match Tag::generate(names.clone()).and_then(|t| t.encode()) {
                Ok(encoded) => EditPlan::Create(encoded),
                Err(err) => EditPlan::Skip(err.to_string()),
            },
            TagEdit::RemoveTag => EditPlan::Skip("not tagged, cannot remove".to_string()),
            TagEdit::RemoveNames(_) | TagEdit::ClearNames => {
                EditPlan::Skip("not tagged, cannot remove name(s)".to_string())
            }
        };
    };

    // Validated by decode above
    let old = current.unwrap_or_default().to_string();

    match edit {
        TagEdit::RemoveTag => return EditPlan::RemoveAttribute(old),
        TagEdit::AddNames(names) => {
            if let Err(err) = tag.add_names(names.iter().cloned()) {
                return EditPlan::Skip(err.to_string());
            }
        }
        TagEdit::RemoveNames(names) => {
            tag.remove_names(names);
        }
        TagEdit::ClearNames => tag.clear_names(),
    }

    match tag.encode() {
        Ok(new) if new == old => EditPlan::Unchanged(old),
        Ok(new) => EditPlan::Rewrite { old, new },
        Err(err) => EditPlan::Skip(err.to_string()),
    }
}

/// Turn the tag command's flags into one edit.
pub fn resolve_tag_edit(args: &TagArgs) -> Result<TagEdit, HelpfulError> {
    let add: Vec<String> = args.add.iter().flat_map(|a| tag::parse_name_list(a)).collect();
    let remove: Vec<String> = args.remove.iter().flat_map(|a| tag::parse_name_list(a)).collect();

    if !args.remove.is_empty() && args.remove_all_names {
        return Err(HelpfulError::conflicting_flags("-x", "-X"));
    }
    if !args.remove.is_empty() && remove.is_empty() {
        return Err(HelpfulError::new("-x requires at least one name"));
    }
    if !args.add.is_empty() {
        if args.remove_all_names {
            return Err(HelpfulError::conflicting_flags("-n", "-X"));
        }
        if !args.remove.is_empty() {
            return Err(HelpfulError::conflicting_flags("-n", "-x"));
        }
    }

    Ok(if args.remove_tag {
        TagEdit::RemoveTag
    } else if args.remove_all_names {
        TagEdit::ClearNames
    } else if !remove.is_empty() {
        TagEdit::RemoveNames(remove)
    } else {
        TagEdit::AddNames(add)
    })
}

/// Turn the untag command's flags into one edit.
pub fn resolve_untag_edit(args: &UntagArgs) -> Result<TagEdit, HelpfulError> {
    let names: Vec<String> = args.names.iter().flat_map(|a| tag::parse_name_list(a)).collect();
    if !names.is_empty() && args.nuke_names {
        return Err(HelpfulError::conflicting_flags("-n", "-N"));
    }

    Ok(if args.nuke_names {
        TagEdit::ClearNames
    } else if !names.is_empty() {
        TagEdit::RemoveNames(names)
    } else {
        TagEdit::RemoveTag
    })
}

/// Execute the tag command
pub fn run(ctx: &CliContext, args: TagArgs) -> anyhow::Result<()> {
    let edit = resolve_tag_edit(&args)?;
    for path in &args.paths {
        apply(ctx, &ctx.store, path, &edit);
    }
    Ok(())
}

/// Execute the untag command
pub fn run_untag(ctx: &CliContext, args: UntagArgs) -> anyhow::Result<()> {
    let edit = resolve_untag_edit(&args)?;
    for path in &args.paths {
        apply(ctx, &ctx.store, path, &edit);
    }
    Ok(())
}

/// Plan and apply one edit. Failures are warned and never stop the batch.
fn apply<S: AttributeStore>(ctx: &CliContext, store: &S, path: &Path, edit: &TagEdit) {
    // Dangling symlinks are still taggable
    if path.symlink_metadata().is_err() {
        warn!(path = %path.display(), "Not found");
        return;
    }

    let current = match store.get(path) {
        Ok(current) => current,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read tag");
            return;
        }
    };

    let plan = plan_edit(current.as_deref(), edit);
    let shown = path.display();
    let would = ctx.would();
    let dry_run = ctx.config.dry_run;

    match plan {
        EditPlan::Skip(reason) => warn!(path = %path.display(), "{}, skipping", reason),
        EditPlan::Unchanged(value) => ctx.detail(format!("{}: tag unchanged ({})", shown, value)),
        EditPlan::Create(new) => {
            if dry_run || report_failure(store.set(path, &new), path, "tag") {
                ctx.say(format!("{}{} {} as {}", would, verb(dry_run, "Tagged", "tag"), shown, new));
            }
        }
        EditPlan::Rewrite { old, new } => {
            if dry_run || report_failure(store.set(path, &new), path, "update tag on") {
                ctx.detail(format!("{}: old tag: {}", shown, old));
                ctx.say(format!("{}{} {} to {}", would, verb(dry_run, "Updated tag on", "update tag on"), shown, new));
            }
        }
        EditPlan::RemoveAttribute(old) => {
            if dry_run || report_failure(store.remove(path), path, "remove tag from") {
                ctx.detail(format!("{}: old tag: {}", shown, old));
                ctx.say(format!("{}{} {}", would, verb(dry_run, "Removed tag from", "remove tag from"), shown));
            }
        }
    }
}

fn verb(dry_run: bool, done: &'static str, planned: &'static str) -> &'static str {
    if dry_run {
        planned
    } else {
        done
    }
}

/// True on success; warns and returns false otherwise.
fn report_failure(result: tagsync::Result<()>, path: &Path, action: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to {}", action);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_tag_with_names() {
        match plan_edit(None, &TagEdit::AddNames(names(&["foo", "bar"]))) {
            EditPlan::Create(value) => {
                let tag = tag::decode(&value).unwrap().unwrap();
                assert_eq!(tag.names, names(&["foo", "bar"]));
                assert!(value.ends_with("/foo;bar"));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_create_bare_tag() {
        match plan_edit(Some(""), &TagEdit::AddNames(Vec::new())) {
            EditPlan::Create(value) => {
                assert_eq!(value.len(), "ts/".len() + 36);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_add_names_keeps_uuid() {
        let id = Uuid::new_v4();
        let old = format!("ts/{}/a", id);
        assert_eq!(
            plan_edit(Some(&old), &TagEdit::AddNames(names(&["b", "a"]))),
            EditPlan::Rewrite {
                old: old.clone(),
                new: format!("ts/{}/a;b", id),
            }
        );
    }

    #[test]
    fn test_remove_names() {
        let id = Uuid::new_v4();
        let old = format!("ts/{}/foo;bar", id);
        assert_eq!(
            plan_edit(Some(&old), &TagEdit::RemoveNames(names(&["foo"]))),
            EditPlan::Rewrite {
                old: old.clone(),
                new: format!("ts/{}/bar", id),
            }
        );
        assert_eq!(
            plan_edit(Some(&old), &TagEdit::RemoveNames(names(&["foo", "bar"]))),
            EditPlan::Rewrite {
                old: old.clone(),
                new: format!("ts/{}", id),
            }
        );
    }

    #[test]
    fn test_clear_names_and_unchanged() {
        let id = Uuid::new_v4();
        let bare = format!("ts/{}", id);
        assert_eq!(
            plan_edit(Some(&bare), &TagEdit::ClearNames),
            EditPlan::Unchanged(bare.clone())
        );
        assert_eq!(
            plan_edit(Some(&bare), &TagEdit::AddNames(Vec::new())),
            EditPlan::Unchanged(bare.clone())
        );
    }

    #[test]
    fn test_remove_tag() {
        let old = format!("ts/{}", Uuid::new_v4());
        assert_eq!(
            plan_edit(Some(&old), &TagEdit::RemoveTag),
            EditPlan::RemoveAttribute(old.clone())
        );
        assert!(matches!(
            plan_edit(None, &TagEdit::RemoveTag),
            EditPlan::Skip(_)
        ));
    }

    #[test]
    fn test_untagged_name_removal_is_skipped() {
        assert!(matches!(
            plan_edit(None, &TagEdit::RemoveNames(names(&["x"]))),
            EditPlan::Skip(_)
        ));
        assert!(matches!(plan_edit(None, &TagEdit::ClearNames), EditPlan::Skip(_)));
    }

    #[test]
    fn test_malformed_and_foreign_values_are_skipped() {
        assert!(matches!(
            plan_edit(Some("ts/nope"), &TagEdit::AddNames(names(&["x"]))),
            EditPlan::Skip(_)
        ));
        assert!(matches!(
            plan_edit(Some("someone-else"), &TagEdit::AddNames(names(&["x"]))),
            EditPlan::Skip(_)
        ));
    }

    #[test]
    fn test_oversized_tag_is_skipped() {
        let long = vec!["n".repeat(300)];
        assert!(matches!(
            plan_edit(None, &TagEdit::AddNames(long)),
            EditPlan::Skip(_)
        ));
    }

    fn tag_args(add: &[&str], remove: &[&str], remove_all_names: bool) -> TagArgs {
        TagArgs {
            paths: vec![PathBuf::from("f")],
            add: names(add),
            remove: names(remove),
            remove_all_names,
            remove_tag: false,
        }
    }

    #[test]
    fn test_add_with_name_removal_is_rejected() {
        let err = resolve_tag_edit(&tag_args(&["a"], &[], true)).unwrap_err();
        assert!(err.to_string().contains("-n and -X"));

        let err = resolve_tag_edit(&tag_args(&["a"], &["b"], false)).unwrap_err();
        assert!(err.to_string().contains("-n and -x"));

        let err = resolve_tag_edit(&tag_args(&[], &["b"], true)).unwrap_err();
        assert!(err.to_string().contains("-x and -X"));
    }

    #[test]
    fn test_resolve_tag_edit() {
        assert_eq!(
            resolve_tag_edit(&tag_args(&["a;b", "c"], &[], false)).unwrap(),
            TagEdit::AddNames(names(&["a", "b", "c"]))
        );
        assert_eq!(
            resolve_tag_edit(&tag_args(&[], &["a,b"], false)).unwrap(),
            TagEdit::RemoveNames(names(&["a", "b"]))
        );
        assert_eq!(
            resolve_tag_edit(&tag_args(&[], &[], true)).unwrap(),
            TagEdit::ClearNames
        );
        assert!(resolve_tag_edit(&tag_args(&[], &[" ; "], false)).is_err());
    }

    #[test]
    fn test_resolve_untag_edit() {
        let untag = |n: &[&str], nuke: bool| UntagArgs {
            paths: vec![PathBuf::from("f")],
            names: names(n),
            nuke_names: nuke,
        };
        assert_eq!(resolve_untag_edit(&untag(&[], false)).unwrap(), TagEdit::RemoveTag);
        assert_eq!(resolve_untag_edit(&untag(&[], true)).unwrap(), TagEdit::ClearNames);
        assert_eq!(
            resolve_untag_edit(&untag(&["x"], false)).unwrap(),
            TagEdit::RemoveNames(names(&["x"]))
        );
        assert!(resolve_untag_edit(&untag(&["x"], true)).is_err());
    }

    fn quiet_context(dry_run: bool) -> CliContext {
        CliContext::new(tagsync::Config {
            dry_run,
            verbosity: tagsync::Verbosity::Quiet,
            ..tagsync::Config::default()
        })
    }

    #[test]
    fn test_apply_writes_through_store() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, "f").unwrap();
        let store = tagsync::MemoryStore::new();
        let ctx = quiet_context(false);

        apply(&ctx, &store, &file, &TagEdit::AddNames(names(&["x"])));
        let value = store.get(&file).unwrap().unwrap();
        let created = tag::decode(&value).unwrap().unwrap();
        assert_eq!(created.names, names(&["x"]));

        apply(&ctx, &store, &file, &TagEdit::ClearNames);
        assert_eq!(store.get(&file).unwrap(), Some(format!("ts/{}", created.id)));

        apply(&ctx, &store, &file, &TagEdit::RemoveTag);
        assert_eq!(store.get(&file).unwrap(), None);

        // Missing paths are skipped
        apply(&ctx, &store, &temp.path().join("nope"), &TagEdit::AddNames(Vec::new()));
        assert_eq!(store.get(&temp.path().join("nope")).unwrap(), None);
    }

    #[test]
    fn test_apply_dry_run_leaves_attribute() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, "f").unwrap();
        let store = tagsync::MemoryStore::new();

        apply(&quiet_context(true), &store, &file, &TagEdit::AddNames(names(&["x"])));
        assert_eq!(store.get(&file).unwrap(), None);
    }
}
