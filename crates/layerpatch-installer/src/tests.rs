use super::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use layerpatch_core::{PatchId, PatchType, ProductConfig, TargetKind};
use tempfile::TempDir;

fn mkdirs(path: &Path) {
    fs::create_dir_all(path).expect("must create dir");
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        mkdirs(parent);
    }
    fs::write(path, contents).expect("must write file");
}

fn id(value: &str) -> PatchId {
    PatchId::from(value)
}

/// modules/layers/{foo,base}, modules/add-ons/extra, `layers=foo`.
fn layered_home() -> TempDir {
    let home = TempDir::new().expect("must create temp dir");
    let modules = home.path().join("modules");
    write_file(&modules.join("layers.conf"), "layers=foo\n");
    mkdirs(&modules.join("layers").join("foo"));
    mkdirs(&modules.join("layers").join("base"));
    mkdirs(&modules.join("add-ons").join("extra"));
    write_file(
        &home.path().join("bin").join("product.conf"),
        "name=Acme\nversion=1.0.0\n",
    );
    home
}

fn layer_structure(home: &Path, name: &str) -> DirectoryStructure {
    DirectoryStructure::for_target(
        TargetKind::Layer,
        name,
        Some(home.join("modules").join("layers").join(name)),
        None,
    )
    .expect("must build structure")
}

fn snapshot_tree(root: &Path) -> BTreeMap<PathBuf, Option<String>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Option<String>>) {
        let mut entries = fs::read_dir(dir)
            .expect("must read dir")
            .map(|entry| entry.expect("must read entry").path())
            .collect::<Vec<_>>();
        entries.sort();
        for path in entries {
            let rel = path.strip_prefix(root).expect("must be under root").to_path_buf();
            if path.is_dir() {
                out.insert(rel, None);
                walk(root, &path, out);
            } else {
                out.insert(rel, Some(fs::read_to_string(&path).expect("must read file")));
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn installed_image_paths() {
    let image = InstalledImage::new("/opt/server");
    assert_eq!(image.modules_dir(), PathBuf::from("/opt/server/modules"));
    assert_eq!(image.bundles_dir(), PathBuf::from("/opt/server/bundles"));
    assert_eq!(
        image.installation_metadata_dir(),
        PathBuf::from("/opt/server/.installation")
    );
    assert_eq!(
        image.patch_history_dir("cp-1"),
        PathBuf::from("/opt/server/.installation/patches/cp-1")
    );
    assert_eq!(
        image.layers_conf_path(),
        PathBuf::from("/opt/server/modules/layers.conf")
    );
    assert_eq!(
        image.product_conf_path(),
        PathBuf::from("/opt/server/bin/product.conf")
    );
}

#[test]
fn missing_product_conf_yields_unknown_identity() {
    let home = TempDir::new().expect("must create temp dir");
    let image = InstalledImage::new(home.path());
    assert_eq!(
        image.load_product_config().expect("must load"),
        ProductConfig::default()
    );
}

#[test]
fn directory_structure_per_kind() {
    let image = InstalledImage::new("/opt/server");
    let identity = DirectoryStructure::for_identity(&image);
    assert_eq!(identity.kind(), TargetKind::Identity);
    assert_eq!(identity.metadata_dir(), Path::new("/opt/server/.installation"));
    assert_eq!(
        identity.installation_info_path(),
        PathBuf::from("/opt/server/.installation/identity.conf")
    );
    assert_eq!(identity.module_patch_dir(&id("p1")), None);
    assert_eq!(identity.bundle_patch_dir(&id("p1")), None);

    let layer = DirectoryStructure::for_target(
        TargetKind::Layer,
        "base",
        Some(PathBuf::from("/m/layers/base")),
        Some(PathBuf::from("/b/layers/base")),
    )
    .expect("must build");
    assert_eq!(layer.metadata_dir(), Path::new("/m/layers/base/.installation"));
    assert_eq!(
        layer.cumulative_link_path(),
        PathBuf::from("/m/layers/base/.installation/cumulative")
    );
    assert_eq!(
        layer.cumulative_refs_path(None),
        PathBuf::from("/m/layers/base/.installation/references/base")
    );
    assert_eq!(
        layer.cumulative_refs_path(Some(&id("cp-2"))),
        PathBuf::from("/m/layers/base/.installation/references/cp-2")
    );
    assert_eq!(
        layer.module_patch_dir(&id("p1")),
        Some(PathBuf::from("/m/layers/base/.overlays/p1"))
    );
    assert_eq!(
        layer.bundle_patch_dir(&id("p1")),
        Some(PathBuf::from("/b/layers/base/.overlays/p1"))
    );

    let add_on = DirectoryStructure::for_target(
        TargetKind::AddOn,
        "extra",
        None,
        Some(PathBuf::from("/b/add-ons/extra")),
    )
    .expect("must build");
    assert_eq!(add_on.metadata_dir(), Path::new("/b/add-ons/extra/.installation"));
    assert_eq!(add_on.module_patch_dir(&id("p1")), None);
    assert_eq!(
        add_on.bundle_patch_dir(&id("p1")),
        Some(PathBuf::from("/b/add-ons/extra/patches/p1"))
    );
    assert_eq!(
        add_on.installation_info_path(),
        PathBuf::from("/b/add-ons/extra/.installation/add-on.conf")
    );
}

#[test]
fn target_without_roots_is_rejected() {
    let err = DirectoryStructure::for_target(TargetKind::AddOn, "ghost", None, None)
        .expect_err("must reject");
    assert!(matches!(
        err,
        PatchingError::MissingRoot { kind: TargetKind::AddOn, ref name } if name == "ghost"
    ));
}

#[test]
fn target_info_load_without_metadata_is_unpatched() {
    let home = layered_home();
    let info = TargetInfo::load(layer_structure(home.path(), "foo")).expect("must load");
    assert_eq!(info.cumulative_patch_id(), None);
    assert!(info.patch_ids().is_empty());
    assert!(info.properties().is_empty());
}

#[test]
fn target_info_reads_reference_files_and_properties() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    write_file(&structure.cumulative_link_path(), "cp-1\n");
    write_file(
        &structure.cumulative_refs_path(Some(&id("cp-1"))),
        "p2\n\np1\n",
    );
    write_file(&structure.installation_info_path(), "owner=ops\n");

    let info = TargetInfo::load(structure).expect("must load");
    assert_eq!(info.cumulative_patch_id(), Some(&id("cp-1")));
    assert_eq!(info.patch_ids(), [id("p2"), id("p1")]);
    assert_eq!(info.properties().get("owner").map(String::as_str), Some("ops"));
    assert!(info.is_applied(&id("cp-1")));
    assert!(info.is_applied(&id("p1")));
    assert!(!info.is_applied(&id("p3")));
}

#[test]
fn base_cumulative_pointer_means_unpatched() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    write_file(&structure.cumulative_link_path(), "base\n");
    write_file(&structure.cumulative_refs_path(None), "p1\n");

    let info = TargetInfo::load(structure).expect("must load");
    assert_eq!(info.cumulative_patch_id(), None);
    assert_eq!(info.patch_ids(), [id("p1")]);
}

#[test]
fn discovery_resolves_configured_layers_and_add_ons() {
    let home = layered_home();
    let modules = home.path().join("modules");
    let processed = process_roots(&[modules.clone()], &[]).expect("must discover");

    let names = processed
        .layers()
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["foo", "base"]);
    assert_eq!(
        processed.layer("foo").and_then(ResolvedRoots::module_root),
        Some(modules.join("layers").join("foo").as_path())
    );
    assert_eq!(processed.layer("foo").and_then(ResolvedRoots::bundle_root), None);
    assert_eq!(
        processed.add_on("extra").and_then(ResolvedRoots::module_root),
        Some(modules.join("add-ons").join("extra").as_path())
    );
}

#[test]
fn unconfigured_root_without_layers_contributes_add_ons_only() {
    let root = TempDir::new().expect("must create temp dir");
    mkdirs(&root.path().join("add-ons").join("tools"));
    write_file(&root.path().join("add-ons").join("README"), "not an add-on");

    let processed = process_roots(&[root.path().to_path_buf()], &[]).expect("must discover");
    assert!(processed.layers().is_empty());
    assert_eq!(processed.add_ons().len(), 1);
    assert!(processed.add_on("tools").is_some());
}

#[test]
fn unconfigured_root_missing_base_layer_is_skipped() {
    let root = TempDir::new().expect("must create temp dir");
    mkdirs(&root.path().join("layers").join("other"));
    mkdirs(&root.path().join("add-ons").join("tools"));

    let processed = process_roots(&[root.path().to_path_buf()], &[]).expect("must discover");
    assert_eq!(processed, ProcessedLayers::default());
}

#[test]
fn declared_layer_without_directory_is_a_configuration_error() {
    let root = TempDir::new().expect("must create temp dir");
    write_file(&root.path().join("layers.conf"), "layers=foo\n");

    let err = process_roots(&[root.path().to_path_buf()], &[]).expect_err("must fail");
    assert!(matches!(err, PatchingError::Config { .. }), "{err}");

    mkdirs(&root.path().join("layers").join("base"));
    let err = process_roots(&[root.path().to_path_buf()], &[]).expect_err("must fail");
    assert!(matches!(err, PatchingError::Config { .. }), "{err}");
}

#[test]
fn fresh_identity_with_missing_declared_layer_fails_discovery() {
    let home = TempDir::new().expect("must create temp dir");
    write_file(&home.path().join("modules").join("layers.conf"), "layers=foo\n");

    let err = InstalledIdentity::load(home.path()).expect_err("must fail");
    assert!(matches!(err, PatchingError::Config { .. }), "{err}");
}

#[test]
fn root_declaring_no_layers_needs_no_layers_directory() {
    let root = TempDir::new().expect("must create temp dir");
    write_file(
        &root.path().join("layers.conf"),
        "layers=\nexclude.base.layer=true\n",
    );
    mkdirs(&root.path().join("add-ons").join("extra"));

    let processed = process_roots(&[root.path().to_path_buf()], &[]).expect("must discover");
    assert!(processed.layers().is_empty());
    assert_eq!(
        processed.add_on("extra").and_then(ResolvedRoots::module_root),
        Some(root.path().join("add-ons").join("extra").as_path())
    );
}

#[test]
fn excluded_base_layer_is_not_required() {
    let root = TempDir::new().expect("must create temp dir");
    write_file(
        &root.path().join("layers.conf"),
        "layers=foo\nexclude.base.layer=true\n",
    );
    mkdirs(&root.path().join("layers").join("foo"));

    let processed = process_roots(&[root.path().to_path_buf()], &[]).expect("must discover");
    assert_eq!(processed.layers().len(), 1);
    assert!(processed.layer("base").is_none());
}

#[test]
fn duplicate_module_root_for_layer_fails() {
    let first = TempDir::new().expect("must create temp dir");
    let second = TempDir::new().expect("must create temp dir");
    mkdirs(&first.path().join("layers").join("base"));
    mkdirs(&second.path().join("layers").join("base"));

    let err = process_roots(
        &[first.path().to_path_buf(), second.path().to_path_buf()],
        &[],
    )
    .expect_err("must fail");
    assert!(matches!(
        err,
        PatchingError::DuplicateLayer {
            kind: TargetKind::Layer,
            root: RootKind::Module,
            ref name,
        } if name == "base"
    ));
}

#[test]
fn duplicate_add_on_across_roots_fails() {
    let first = TempDir::new().expect("must create temp dir");
    let second = TempDir::new().expect("must create temp dir");
    mkdirs(&first.path().join("add-ons").join("extra"));
    mkdirs(&second.path().join("add-ons").join("extra"));

    let err = process_roots(&[], &[first.path().to_path_buf(), second.path().to_path_buf()])
        .expect_err("must fail");
    assert!(matches!(
        err,
        PatchingError::DuplicateLayer {
            kind: TargetKind::AddOn,
            root: RootKind::Bundle,
            ..
        }
    ));
}

#[test]
fn module_and_bundle_roots_merge_for_same_layer() {
    let modules = TempDir::new().expect("must create temp dir");
    let bundles = TempDir::new().expect("must create temp dir");
    for root in [modules.path(), bundles.path()] {
        write_file(
            &root.join("layers.conf"),
            "layers=x\nexclude.base.layer=true\n",
        );
        mkdirs(&root.join("layers").join("x"));
    }

    let processed = process_roots(
        &[modules.path().to_path_buf()],
        &[bundles.path().to_path_buf()],
    )
    .expect("must discover");
    let roots = processed.layer("x").expect("layer x");
    assert_eq!(
        roots.module_root(),
        Some(modules.path().join("layers").join("x").as_path())
    );
    assert_eq!(
        roots.bundle_root(),
        Some(bundles.path().join("layers").join("x").as_path())
    );
}

#[test]
fn discovery_is_idempotent() {
    let home = layered_home();
    let first = InstalledIdentity::load(home.path()).expect("must load");
    let second = InstalledIdentity::load(home.path()).expect("must load");
    assert_eq!(first, second);
    assert_eq!(first.identity().name(), "Acme");
    assert_eq!(first.identity().version(), "1.0.0");
    assert_eq!(first.layers().len(), 2);
    assert_eq!(first.add_ons().len(), 1);
    assert_eq!(first.layer("foo").map(Layer::kind), Some(TargetKind::Layer));
    assert_eq!(first.add_on("extra").map(AddOn::kind), Some(TargetKind::AddOn));
}

#[test]
fn all_installed_patches_unions_targets_and_history() {
    let home = layered_home();
    let foo = layer_structure(home.path(), "foo");
    write_file(&foo.cumulative_link_path(), "cp-1\n");
    write_file(&foo.cumulative_refs_path(Some(&id("cp-1"))), "p1\n");
    let image = InstalledImage::new(home.path());
    write_file(&image.installation_metadata_dir().join("cumulative"), "cp-1\n");
    mkdirs(&image.patch_history_dir("cp-0"));
    mkdirs(&image.patch_history_dir("p1"));

    let installed = InstalledIdentity::load(home.path()).expect("must load");
    assert_eq!(
        installed.all_installed_patches(),
        [id("cp-1"), id("p1"), id("cp-0")]
    );
}

#[test]
fn cumulative_after_one_off_is_rejected_without_mutation() {
    let home = layered_home();
    let mut target =
        MutableTarget::new(TargetInfo::load(layer_structure(home.path(), "foo")).expect("load"));
    target
        .apply(id("cp-1"), PatchType::Cumulative)
        .expect("cumulative on clean target");
    target.apply(id("p1"), PatchType::OneOff).expect("one-off");

    let before = target.modified_state();
    let err = target
        .apply(id("cp-2"), PatchType::Cumulative)
        .expect_err("must reject");
    assert!(matches!(err, PatchingError::InvalidState(_)));
    assert_eq!(target.modified_state(), before);
}

#[test]
fn rollback_requires_most_recent_patch() {
    let home = layered_home();
    let mut target =
        MutableTarget::new(TargetInfo::load(layer_structure(home.path(), "foo")).expect("load"));
    target.apply(id("cp-1"), PatchType::Cumulative).expect("apply");
    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    target.apply(id("p2"), PatchType::OneOff).expect("apply");

    let before = target.modified_state();
    for candidate in ["p1", "cp-1", "p9"] {
        let err = target.rollback(&id(candidate)).expect_err("must reject");
        assert!(matches!(err, PatchingError::InvalidState(_)), "{err}");
        assert_eq!(target.modified_state(), before);
    }
}

#[test]
fn one_off_rollback_sequence() {
    let home = layered_home();
    let mut target =
        MutableTarget::new(TargetInfo::load(layer_structure(home.path(), "foo")).expect("load"));
    target.apply(id("patch-1"), PatchType::OneOff).expect("apply");
    target.apply(id("patch-2"), PatchType::OneOff).expect("apply");
    assert_eq!(target.patch_ids(), [id("patch-2"), id("patch-1")]);

    target.rollback(&id("patch-2")).expect("rollback head");
    assert_eq!(target.patch_ids(), [id("patch-1")]);

    let err = target.rollback(&id("patch-2")).expect_err("already rolled back");
    assert!(matches!(err, PatchingError::InvalidState(_)));
    assert_eq!(target.patch_ids(), [id("patch-1")]);
}

#[test]
fn cumulative_rollback_keeps_marker_until_cleared() {
    let home = layered_home();
    let mut target =
        MutableTarget::new(TargetInfo::load(layer_structure(home.path(), "foo")).expect("load"));
    target.apply(id("cp-1"), PatchType::Cumulative).expect("apply");

    target.rollback(&id("cp-1")).expect("baseline rollback accepted");
    assert_eq!(target.cumulative_patch_id(), Some(&id("cp-1")));

    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    assert!(matches!(
        target.clear_cumulative(),
        Err(PatchingError::InvalidState(_))
    ));
    target.rollback(&id("p1")).expect("rollback");
    target.clear_cumulative().expect("clear");
    assert_eq!(target.cumulative_patch_id(), None);
    assert!(!target.is_modified());
}

#[test]
fn unstorable_patch_ids_are_rejected_without_mutation() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    let mut target = MutableTarget::new(TargetInfo::load(structure.clone()).expect("load"));
    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    let before = target.modified_state();

    let rejected = [
        ("base", PatchType::Cumulative),
        ("a\nb", PatchType::OneOff),
        ("two words", PatchType::OneOff),
        ("", PatchType::OneOff),
        ("../../../../escaped", PatchType::Cumulative),
        ("..", PatchType::OneOff),
        ("nested/p2", PatchType::OneOff),
        ("nested\\p2", PatchType::OneOff),
    ];
    for (candidate, patch_type) in rejected {
        let err = target
            .apply(id(candidate), patch_type)
            .expect_err("must reject");
        assert!(matches!(err, PatchingError::InvalidState(_)), "{candidate:?}: {err}");
        assert_eq!(target.modified_state(), before);
    }

    target.persist().expect("persist");
    assert_eq!(TargetInfo::load(structure.clone()).expect("load"), before);
    assert!(!home.path().join("modules").join("escaped").exists());
    let references = fs::read_dir(structure.metadata_dir().join("references"))
        .expect("must read references")
        .map(|entry| entry.expect("must read entry").file_name())
        .collect::<Vec<_>>();
    assert_eq!(references, ["base"]);
}

#[test]
fn persist_writes_reference_files() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    let mut target = MutableTarget::new(TargetInfo::load(structure.clone()).expect("load"));
    target.apply(id("cp-1"), PatchType::Cumulative).expect("apply");
    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    target.apply(id("p2"), PatchType::OneOff).expect("apply");
    target.persist().expect("persist");

    assert_eq!(
        fs::read_to_string(structure.cumulative_link_path()).expect("read"),
        "cp-1\n"
    );
    assert_eq!(
        fs::read_to_string(structure.cumulative_refs_path(Some(&id("cp-1")))).expect("read"),
        "p2\np1\n"
    );
    let reloaded = TargetInfo::load(structure).expect("load");
    assert_eq!(reloaded, target.modified_state());
}

#[test]
fn restore_reverts_persisted_state() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    write_file(&structure.cumulative_link_path(), "cp-1\n");
    write_file(&structure.cumulative_refs_path(Some(&id("cp-2"))), "old\n");
    let original = TargetInfo::load(structure.clone()).expect("load");

    let mut target = MutableTarget::new(original.clone());
    target.apply(id("cp-2"), PatchType::Cumulative).expect("apply");
    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    target.persist().expect("persist");
    assert_eq!(
        TargetInfo::load(structure.clone()).expect("load").patch_ids(),
        [id("p1")]
    );

    target.restore().expect("restore");
    assert_eq!(TargetInfo::load(structure.clone()).expect("load"), original);
    assert_eq!(
        fs::read_to_string(structure.cumulative_refs_path(Some(&id("cp-2")))).expect("read"),
        "old\n"
    );
}

#[test]
fn module_path_orders_overlays_before_root() {
    let home = layered_home();
    let structure = layer_structure(home.path(), "foo");
    let mut target = MutableTarget::new(TargetInfo::load(structure.clone()).expect("load"));
    target.apply(id("cp-1"), PatchType::Cumulative).expect("apply");
    target.apply(id("p1"), PatchType::OneOff).expect("apply");
    target.apply(id("p2"), PatchType::OneOff).expect("apply");

    let overlay = |patch: &str| structure.module_patch_dir(&id(patch)).expect("overlay dir");
    mkdirs(&overlay("cp-1"));
    mkdirs(&overlay("p2"));

    let module_root = structure.module_root().expect("module root").to_path_buf();
    assert_eq!(
        module_path(&target.modified_state()),
        vec![overlay("p2"), overlay("cp-1"), module_root]
    );
    assert!(bundle_path(&target.modified_state()).is_empty());
}

#[test]
fn second_modification_is_rejected_until_first_finishes() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");

    let modification = manager.modify_installation().expect("first");
    assert!(matches!(
        manager.modify_installation(),
        Err(PatchingError::AlreadyModifying)
    ));
    assert!(matches!(manager.reload(), Err(PatchingError::AlreadyModifying)));
    modification.cancel();

    let modification = manager.modify_installation().expect("after cancel");
    drop(modification);
    manager.modify_installation().expect("after drop");
}

#[test]
fn resolve_unknown_target_is_not_found() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    let mut modification = manager.modify_installation().expect("modify");

    assert!(modification.resolve("foo", TargetKind::Layer).is_ok());
    assert!(modification.resolve("extra", TargetKind::AddOn).is_ok());
    assert!(modification.resolve("Acme", TargetKind::Identity).is_ok());
    let err = modification
        .resolve("extra", TargetKind::Layer)
        .expect_err("add-on is not a layer");
    assert!(matches!(
        err,
        PatchingError::NotFound { kind: TargetKind::Layer, ref name } if name == "extra"
    ));
    assert_eq!(modification.layer_names().collect::<Vec<_>>(), ["base", "foo"]);
    assert_eq!(modification.add_on_names().collect::<Vec<_>>(), ["extra"]);
}

#[test]
fn complete_persists_and_replaces_cached_state() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    let before = manager.installation_state();

    let mut modification = manager.modify_installation().expect("modify");
    assert_eq!(modification.name(), "Acme");
    assert_eq!(modification.version(), "1.0.0");
    modification
        .identity()
        .apply(id("p1"), PatchType::OneOff)
        .expect("identity");
    modification
        .resolve("foo", TargetKind::Layer)
        .expect("foo")
        .apply(id("p1"), PatchType::OneOff)
        .expect("apply");
    let state = modification.complete().expect("complete");

    assert_eq!(state.layer("foo").expect("foo").patch_ids(), [id("p1")]);
    assert_eq!(manager.installation_state(), state);
    assert_ne!(manager.installation_state(), before);
    assert!(state.layer("base").expect("base").patch_ids().is_empty());

    let foo = TargetInfo::load(layer_structure(home.path(), "foo")).expect("load");
    assert_eq!(foo.patch_ids(), [id("p1")]);
    let identity = TargetInfo::load(DirectoryStructure::for_identity(&InstalledImage::new(
        home.path(),
    )))
    .expect("load");
    assert_eq!(identity.patch_ids(), [id("p1")]);

    manager.modify_installation().expect("writable again");
}

#[test]
fn failed_complete_restores_every_target() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    let image = InstalledImage::new(home.path());
    let foo_before = TargetInfo::load(layer_structure(home.path(), "foo")).expect("load");
    let identity_before =
        TargetInfo::load(DirectoryStructure::for_identity(&image)).expect("load");
    let state_before = manager.installation_state();

    let mut modification = manager.modify_installation().expect("modify");
    modification
        .resolve("foo", TargetKind::Layer)
        .expect("foo")
        .apply(id("cp-1"), PatchType::Cumulative)
        .expect("apply");
    let add_on = modification
        .resolve("extra", TargetKind::AddOn)
        .expect("extra");
    add_on.apply(id("p1"), PatchType::OneOff).expect("apply");
    let blocked = add_on.directory_structure().metadata_dir().to_path_buf();
    modification
        .identity()
        .apply(id("cp-1"), PatchType::Cumulative)
        .expect("apply");

    // A plain file where the add-on's metadata directory should be.
    write_file(&blocked, "blocked");

    let err = modification.complete().expect_err("add-on persist must fail");
    assert!(matches!(err, PatchingError::Io { .. }), "{err}");

    assert_eq!(
        TargetInfo::load(layer_structure(home.path(), "foo")).expect("load"),
        foo_before
    );
    assert_eq!(
        TargetInfo::load(DirectoryStructure::for_identity(&image)).expect("load"),
        identity_before
    );
    assert_eq!(fs::read_to_string(&blocked).expect("read"), "blocked");
    assert_eq!(manager.installation_state(), state_before);
    manager.modify_installation().expect("writable after failure");
}

#[test]
fn cancel_never_writes() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    let before = snapshot_tree(home.path());

    let mut modification = manager.modify_installation().expect("modify");
    modification
        .resolve("base", TargetKind::Layer)
        .expect("base")
        .apply(id("p1"), PatchType::OneOff)
        .expect("apply");
    modification
        .identity()
        .apply(id("p1"), PatchType::OneOff)
        .expect("apply");
    modification.cancel();

    assert_eq!(snapshot_tree(home.path()), before);
}

#[test]
fn modification_reads_identity_fresh_from_disk() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    let image = InstalledImage::new(home.path());
    write_file(&image.installation_metadata_dir().join("cumulative"), "cp-7\n");

    let mut modification = manager.modify_installation().expect("modify");
    assert_eq!(
        modification.identity().cumulative_patch_id(),
        Some(&id("cp-7"))
    );
    assert_eq!(
        manager.installed_identity().identity().info().cumulative_patch_id(),
        None
    );
}

#[test]
fn restart_required_blocks_modifications() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");

    assert!(!manager.is_restart_required());
    assert!(manager.set_restart_required());
    assert!(!manager.set_restart_required());
    assert!(matches!(
        manager.modify_installation(),
        Err(PatchingError::RestartRequired)
    ));

    manager.clear_restart_required();
    manager.modify_installation().expect("modify after clear");
}

#[test]
fn reload_picks_up_out_of_band_changes() {
    let home = layered_home();
    let manager = InstallationManager::load(home.path()).expect("must load");
    mkdirs(&home.path().join("modules").join("add-ons").join("late"));
    let foo = layer_structure(home.path(), "foo");
    write_file(&foo.cumulative_refs_path(None), "p5\n");

    manager.reload().expect("reload");
    let installed = manager.installed_identity();
    assert!(installed.add_on("late").is_some());
    assert_eq!(
        manager
            .installation_state()
            .layer("foo")
            .expect("foo")
            .patch_ids(),
        [id("p5")]
    );
}
