//! End-to-end tests for the synchronizer.
//!
//! These tests build a real directory hierarchy with TOML config files and
//! verify that:
//! - Config changes reach the targets that inherit them
//! - Deeper configs shield their targets
//! - Deleted and moved configs hand their targets back to an ancestor
//! - Structural changes keep the tree consistent with the disk

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use folder_config::path::canonicalize;
use folder_config::{
    ConfigStore, FolderEvent, FolderTree, PathChange, Reflect, SectionRegistry, TargetHost, TreeError,
    TreeSettings, TreeSynchronizer, Value,
};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use tempfile::TempDir;

const CONFIG: &str = "AssetConfig.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
enum Compression {
    #[default]
    None,
    Normal,
    High,
}
folder_config::leaf_enum!(Compression { None, Normal, High });

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextureRules {
    max_size: i32,
    readable: bool,
    compression: Compression,
}
folder_config::reflect!(TextureRules {
    max_size: i32,
    readable: bool,
    compression: Compression,
});

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AudioRules {
    mono: bool,
    quality: f32,
}
folder_config::reflect!(AudioRules { mono: bool, quality: f32 });

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetRules {
    texture: TextureRules,
    audio: AudioRules,
}

fn texture_section(rules: &AssetRules) -> &dyn Reflect {
    &rules.texture
}

fn audio_section(rules: &AssetRules) -> &dyn Reflect {
    &rules.audio
}

struct TextureImporter {
    max_size: i32,
    readable: bool,
    compression: Compression,
    mipmaps: bool,
}
folder_config::reflect!(TextureImporter {
    max_size: i32,
    readable: bool,
    compression: Compression,
    mipmaps: bool,
});

impl Default for TextureImporter {
    fn default() -> Self {
        Self {
            max_size: 1024,
            readable: true,
            compression: Compression::Normal,
            mipmaps: true,
        }
    }
}

struct AudioImporter {
    mono: bool,
    quality: f32,
    sample_rate: u32,
}
folder_config::reflect!(AudioImporter {
    mono: bool,
    quality: f32,
    sample_rate: u32,
});

/// Parses config files as TOML and counts destroyed configs.
#[derive(Clone, Default)]
struct TomlStore {
    destroyed: Rc<Cell<usize>>,
}

impl ConfigStore<AssetRules> for TomlStore {
    fn load(&mut self, path: &Path) -> anyhow::Result<Option<AssetRules>> {
        let Ok(text) = fs::read_to_string(path) else {
            return Ok(None);
        };
        Ok(toml::from_str(&text).ok())
    }

    fn destroy(&mut self, _config: &AssetRules) -> anyhow::Result<()> {
        self.destroyed.set(self.destroyed.get() + 1);
        Ok(())
    }
}

struct Asset {
    kind: &'static str,
    settings: Box<dyn Reflect>,
}

/// Targets held in memory, keyed by canonical path.
#[derive(Default)]
struct MemoryHost {
    assets: BTreeMap<PathBuf, Asset>,
    commits: Vec<PathBuf>,
    fail_commits: bool,
}

impl MemoryHost {
    fn texture(&mut self, path: &Path) {
        fs::write(path, b"png").unwrap();
        self.assets.insert(
            canonicalize(path),
            Asset {
                kind: "texture",
                settings: Box::new(TextureImporter::default()),
            },
        );
    }

    fn audio(&mut self, path: &Path) {
        fs::write(path, b"wav").unwrap();
        self.assets.insert(
            canonicalize(path),
            Asset {
                kind: "audio",
                settings: Box::new(AudioImporter {
                    mono: false,
                    quality: 1.0,
                    sample_rate: 44_100,
                }),
            },
        );
    }

    /// Re-key a target whose file was moved on disk.
    fn moved(&mut self, from: &Path, to: &Path) {
        let asset = self.assets.remove(&canonicalize(from)).unwrap();
        self.assets.insert(canonicalize(to), asset);
    }

    fn value(&self, path: &Path, field: &str) -> Option<Value> {
        self.assets.get(&canonicalize(path))?.settings.value(field)
    }

    fn commit_count(&self) -> usize {
        self.commits.len()
    }
}

impl TargetHost for MemoryHost {
    fn targets_under(&self, dir: &Path) -> Vec<PathBuf> {
        let dir = canonicalize(dir);
        self.assets
            .keys()
            .filter(|path| path.starts_with(&dir))
            .cloned()
            .collect()
    }

    fn target_mut(&mut self, path: &Path) -> Option<(&str, &mut dyn Reflect)> {
        let asset = self.assets.get_mut(&canonicalize(path))?;
        let settings: &mut dyn Reflect = &mut *asset.settings;
        Some((asset.kind, settings))
    }

    fn commit(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.fail_commits {
            anyhow::bail!("import failed");
        }
        self.commits.push(canonicalize(path));
        Ok(())
    }
}

fn rules(max_size: i32, compression: &str) -> String {
    format!(
        "[texture]\nmax_size = {max_size}\ncompression = \"{compression}\"\n\n\
         [audio]\nmono = true\nquality = 0.5\n"
    )
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join(CONFIG);
    fs::write(&path, content).unwrap();
    path
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// ```text
/// Assets/               R  (2048, None)   logo.png
///   Textures/           T  (512, High)    a.png
///     UI/                                 button.png
///     Hero/             H  (4096, None)   face.png
///   Audio/                                hit.wav
/// ```
struct Project {
    _temp_dir: TempDir,
    root: PathBuf,
    store: TomlStore,
    host: MemoryHost,
    sync: TreeSynchronizer<AssetRules>,
}

impl Project {
    fn new() -> Self {
        Self::with_settings(TreeSettings::new(CONFIG))
    }

    fn with_settings(settings: TreeSettings) -> Self {
        init_logging();
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("Assets");
        let textures = root.join("Textures");
        fs::create_dir_all(textures.join("UI")).unwrap();
        fs::create_dir_all(textures.join("Hero")).unwrap();
        fs::create_dir_all(root.join("Audio")).unwrap();

        write_config(&root, &rules(2048, "None"));
        write_config(&textures, &rules(512, "High"));
        write_config(&textures.join("Hero"), &rules(4096, "None"));

        let mut host = MemoryHost::default();
        host.texture(&root.join("logo.png"));
        host.texture(&textures.join("a.png"));
        host.texture(&textures.join("UI").join("button.png"));
        host.texture(&textures.join("Hero").join("face.png"));
        host.audio(&root.join("Audio").join("hit.wav"));

        let store = TomlStore::default();
        let tree = FolderTree::new(settings, Box::new(store.clone()));
        let registry = SectionRegistry::new()
            .with("texture", texture_section)
            .with("audio", audio_section);
        let mut sync = TreeSynchronizer::new(tree, registry);
        sync.init(&root).unwrap();

        Self {
            _temp_dir: temp_dir,
            root,
            store,
            host,
            sync,
        }
    }

    fn textures(&self) -> PathBuf {
        self.root.join("Textures")
    }

    fn max_size(&self, path: &Path) -> Option<Value> {
        self.host.value(path, "max_size")
    }

    fn process(&mut self, changes: Vec<PathChange>) -> folder_config::BatchReport {
        self.sync.process_changes(changes, &mut self.host).unwrap()
    }
}

#[test]
fn test_init_resolves_nearest_config() {
    let project = Project::new();
    let textures = project.textures();
    let tree = project.sync.tree();

    assert_eq!(tree.len(), 5);
    assert_eq!(tree.stats().configs, 3);

    let own = project.sync.resolve(&textures, false).unwrap();
    let inherited = project.sync.resolve(&textures.join("UI"), true).unwrap();
    assert!(Arc::ptr_eq(&own, &inherited));
    assert_eq!(inherited.texture.max_size, 512);
    assert!(project.sync.resolve(&textures.join("UI"), false).is_none());

    let for_button = project
        .sync
        .resolve_for_target(&textures.join("UI").join("button.png"))
        .unwrap();
    assert!(Arc::ptr_eq(&own, &for_button));
    assert_eq!(
        project
            .sync
            .resolve(&project.root.join("Audio"), true)
            .unwrap()
            .texture
            .max_size,
        2048
    );
}

#[test]
fn test_apply_below_skips_shielded_targets() {
    let mut project = Project::new();
    let textures = project.textures();

    let report = project.sync.apply_below(&textures, &mut project.host).unwrap();

    assert_eq!(report.targets_visited, 2);
    assert_eq!(report.targets_changed, 2);
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(512)));
    assert_eq!(
        project.host.value(&textures.join("UI").join("button.png"), "compression"),
        Some(Value::Enum {
            ty: "Compression",
            variant: "High",
        })
    );
    assert_eq!(
        project.max_size(&textures.join("Hero").join("face.png")),
        Some(Value::I32(1024))
    );
    // Members the config does not declare are left alone.
    assert_eq!(
        project.host.value(&textures.join("a.png"), "mipmaps"),
        Some(Value::Bool(true))
    );

    let again = project.sync.apply_below(&textures, &mut project.host).unwrap();
    assert_eq!(again.targets_visited, 2);
    assert_eq!(again.targets_changed, 0);
    assert_eq!(project.host.commit_count(), 2);
}

#[test]
fn test_sections_follow_target_kind() {
    let mut project = Project::new();
    let hit = project.root.join("Audio").join("hit.wav");

    project.sync.apply_below(&project.root, &mut project.host).unwrap();

    assert_eq!(project.host.value(&hit, "mono"), Some(Value::Bool(true)));
    assert_eq!(project.host.value(&hit, "quality"), Some(Value::F32(0.5)));
    assert_eq!(project.host.value(&hit, "sample_rate"), Some(Value::U32(44_100)));
    assert_eq!(
        project.max_size(&project.root.join("logo.png")),
        Some(Value::I32(2048))
    );
}

#[test]
fn test_new_config_reaches_inheriting_targets() {
    let mut project = Project::new();
    let textures = project.textures();
    let ui = textures.join("UI");

    let config = write_config(&ui, &rules(128, "None"));
    let report = project.process(vec![PathChange::created(&config)]);

    assert_eq!(report.applied, 1);
    assert_eq!(report.targets_changed, 1);
    assert_eq!(project.max_size(&ui.join("button.png")), Some(Value::I32(128)));
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(1024)));
    assert_eq!(project.host.commits, vec![canonicalize(&ui.join("button.png"))]);
}

#[test]
fn test_overwritten_config_destroys_previous() {
    let mut project = Project::new();
    let textures = project.textures();
    let before = project.sync.resolve(&textures, false).unwrap();

    let config = write_config(&textures, &rules(256, "Normal"));
    project.process(vec![PathChange::created(&config)]);

    let after = project.sync.resolve(&textures, false).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(project.store.destroyed.get(), 1);
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(256)));
    assert_eq!(
        project.max_size(&textures.join("UI").join("button.png")),
        Some(Value::I32(256))
    );
    assert_eq!(
        project.max_size(&textures.join("Hero").join("face.png")),
        Some(Value::I32(1024))
    );
}

#[test]
fn test_deleted_config_hands_targets_to_ancestor() {
    let mut project = Project::new();
    let textures = project.textures();
    let hero = textures.join("Hero");

    let config = textures.join(CONFIG);
    fs::remove_file(&config).unwrap();
    let report = project.process(vec![PathChange::deleted(&config)]);

    assert_eq!(report.applied, 1);
    assert_eq!(project.store.destroyed.get(), 1);
    assert!(project.sync.resolve(&textures, false).is_none());
    assert_eq!(
        project.sync.resolve(&hero, true).unwrap().texture.max_size,
        4096
    );
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(2048)));
    assert_eq!(
        project.max_size(&textures.join("UI").join("button.png")),
        Some(Value::I32(2048))
    );
    assert_eq!(project.max_size(&hero.join("face.png")), Some(Value::I32(1024)));
}

#[test]
fn test_deleted_config_without_reapply() {
    let mut project =
        Project::with_settings(TreeSettings::new(CONFIG).with_reapply_on_delete(false));
    let config = project.textures().join(CONFIG);

    fs::remove_file(&config).unwrap();
    let report = project.process(vec![PathChange::deleted(&config)]);

    assert_eq!(report.applied, 1);
    assert_eq!(report.targets_visited, 0);
    assert_eq!(project.host.commit_count(), 0);
}

#[test]
fn test_moved_config_keeps_identity() {
    let mut project = Project::new();
    let textures = project.textures();
    let ui = textures.join("UI");
    let before = project.sync.resolve(&textures, false).unwrap();

    let from = textures.join(CONFIG);
    let to = ui.join(CONFIG);
    fs::rename(&from, &to).unwrap();
    let report = project.process(vec![PathChange::moved(&from, &to)]);

    assert_eq!(report.applied, 1);
    assert!(report.rejected.is_empty());
    assert_eq!(project.store.destroyed.get(), 0);
    assert!(Arc::ptr_eq(&project.sync.resolve(&ui, false).unwrap(), &before));
    assert!(project.sync.resolve(&textures, false).is_none());

    assert_eq!(project.max_size(&ui.join("button.png")), Some(Value::I32(512)));
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(2048)));
}

#[test]
fn test_config_rename_is_rejected() {
    let mut project = Project::new();
    let textures = project.textures();

    let from = textures.join(CONFIG);
    let to = textures.join("AssetConfig.old");
    fs::rename(&from, &to).unwrap();
    let report = project.process(vec![PathChange::moved(&from, &to)]);

    assert_eq!(report.applied, 0);
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(
        report.rejected[0].error,
        TreeError::ConfigRename { .. }
    ));
    assert_eq!(
        project.sync.resolve(&textures, false).unwrap().texture.max_size,
        512
    );
    assert_eq!(project.host.commit_count(), 0);
}

#[test]
fn test_folder_move_rekeys_subtree() {
    let mut project = Project::new();
    let textures = project.textures();
    let images = project.root.join("Images");
    let hero_id = project
        .sync
        .tree()
        .get_folder_info(&textures.join("Hero"))
        .unwrap()
        .id();

    fs::rename(&textures, &images).unwrap();
    let report = project.process(vec![PathChange::moved(&textures, &images)]);

    assert_eq!(report.applied, 1);
    let tree = project.sync.tree();
    assert!(!tree.contains(&textures));
    assert!(!tree.contains(&textures.join("Hero")));
    assert_eq!(
        tree.get_folder_info(&images.join("Hero")).unwrap().id(),
        hero_id
    );
    assert_eq!(
        project.sync.resolve(&images.join("UI"), true).unwrap().texture.max_size,
        512
    );
}

#[test]
fn test_folder_move_into_itself_is_rejected() {
    let mut project = Project::new();
    let textures = project.textures();

    let report = project
        .sync
        .process_batch(
            [FolderEvent::FolderMoved {
                from: textures.clone(),
                to: textures.join("UI").join("Nested"),
            }],
            &mut project.host,
        )
        .unwrap();

    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(
        report.rejected[0].error,
        TreeError::MoveIntoSelf { .. }
    ));
    assert!(project.sync.tree().contains(&textures.join("UI")));
}

#[test]
fn test_batch_propagation_follows_later_folder_move() {
    let mut project = Project::new();
    let textures = project.textures();
    let ui = textures.join("UI");
    let widgets = textures.join("Widgets");
    let before = project.sync.resolve(&textures, false).unwrap();

    let from = textures.join(CONFIG);
    let to = ui.join(CONFIG);
    fs::rename(&from, &to).unwrap();
    fs::rename(&ui, &widgets).unwrap();
    project
        .host
        .moved(&ui.join("button.png"), &widgets.join("button.png"));

    let report = project
        .sync
        .process_batch(
            [
                FolderEvent::ConfigMoved { from, to },
                FolderEvent::FolderMoved {
                    from: ui,
                    to: widgets.clone(),
                },
            ],
            &mut project.host,
        )
        .unwrap();

    assert_eq!(report.applied, 2);
    assert!(report.rejected.is_empty());
    let button = widgets.join("button.png");
    assert!(Arc::ptr_eq(
        &project.sync.resolve_for_target(&button).unwrap(),
        &before
    ));
    assert_eq!(project.max_size(&button), Some(Value::I32(512)));
    assert_eq!(project.max_size(&textures.join("a.png")), Some(Value::I32(2048)));
    assert_eq!(
        project.max_size(&textures.join("Hero").join("face.png")),
        Some(Value::I32(1024))
    );
}

#[test]
fn test_batch_asset_follows_later_folder_move() {
    let mut project = Project::new();
    let ui = project.textures().join("UI");
    let widgets = project.root.join("Widgets");

    let icon = ui.join("icon.png");
    project.host.texture(&icon);
    fs::rename(&ui, &widgets).unwrap();
    let moved_icon = widgets.join("icon.png");
    project.host.moved(&icon, &moved_icon);
    project
        .host
        .moved(&ui.join("button.png"), &widgets.join("button.png"));

    let report = project
        .sync
        .process_batch(
            [
                FolderEvent::AssetCreated { path: icon },
                FolderEvent::FolderMoved {
                    from: ui,
                    to: widgets.clone(),
                },
            ],
            &mut project.host,
        )
        .unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(report.targets_changed, 1);
    assert_eq!(project.max_size(&moved_icon), Some(Value::I32(2048)));
    assert_eq!(
        project.max_size(&widgets.join("button.png")),
        Some(Value::I32(1024))
    );
}

#[test]
fn test_batch_skips_work_for_folders_deleted_later() {
    let mut project = Project::new();
    let ui = project.textures().join("UI");

    let config = write_config(&ui, &rules(128, "None"));
    let report = project
        .sync
        .process_batch(
            [
                FolderEvent::ConfigCreated { path: config },
                FolderEvent::FolderDeleted { path: ui },
            ],
            &mut project.host,
        )
        .unwrap();

    assert_eq!(report.applied, 2);
    assert_eq!(report.targets_visited, 0);
    assert_eq!(project.host.commit_count(), 0);
    assert_eq!(project.store.destroyed.get(), 1);
}

#[test]
fn test_asset_events_apply_resolved_config() {
    let mut project = Project::new();
    let ui = project.textures().join("UI");

    let icon = ui.join("icon.png");
    project.host.texture(&icon);
    let report = project.process(vec![PathChange::created(&icon)]);
    assert_eq!(report.targets_changed, 1);
    assert_eq!(project.max_size(&icon), Some(Value::I32(512)));

    let again = project.process(vec![PathChange::created(&icon)]);
    assert_eq!(again.targets_visited, 1);
    assert_eq!(again.targets_changed, 0);
    assert_eq!(project.host.commit_count(), 1);

    let moved = project.root.join("Audio").join("icon.png");
    fs::rename(&icon, &moved).unwrap();
    project.host.texture(&moved);
    project.process(vec![PathChange::moved(&icon, &moved)]);
    assert_eq!(project.max_size(&moved), Some(Value::I32(2048)));
}

#[test]
fn test_created_folder_grafts_existing_content() {
    let mut project = Project::new();
    let imported = project.root.join("Imported");
    let deep = imported.join("Deep");
    fs::create_dir_all(&deep).unwrap();
    write_config(&deep, &rules(64, "None"));
    project.host.texture(&imported.join("i.png"));
    project.host.texture(&deep.join("d.png"));

    let report = project.process(vec![PathChange::created(&imported)]);

    assert_eq!(report.applied, 1);
    assert!(project.sync.tree().contains(&deep));
    assert_eq!(project.max_size(&deep.join("d.png")), Some(Value::I32(64)));
    assert_eq!(project.max_size(&imported.join("i.png")), Some(Value::I32(2048)));
}

#[test]
fn test_folder_delete_destroys_configs() {
    let mut project = Project::new();
    let textures = project.textures();

    fs::remove_dir_all(&textures).unwrap();
    let report = project.process(vec![PathChange::deleted(&textures)]);

    assert_eq!(report.applied, 1);
    assert_eq!(project.store.destroyed.get(), 2);
    assert_eq!(project.sync.tree().len(), 2);
    assert!(!project.sync.tree().contains(&textures.join("Hero")));
}

#[test]
fn test_ignored_folders_are_not_tracked() {
    let mut project = Project::new();
    let cache = project.root.join(".cache");
    fs::create_dir(&cache).unwrap();
    let config = write_config(&cache, &rules(1, "None"));

    let report = project.process(vec![
        PathChange::created(&cache),
        PathChange::created(&config),
    ]);

    assert_eq!(report.applied, 0);
    assert!(!project.sync.tree().contains(&cache));
}

#[test]
fn test_commit_failure_is_reported() {
    let mut project = Project::new();
    project.host.fail_commits = true;

    let result = project
        .sync
        .apply_below(&project.textures(), &mut project.host);

    assert!(matches!(result, Err(TreeError::Commit { .. })));
}
