//! Integration tests for capability resolution, the bulk subject
//! query and catalog sync.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use accesstree_sdk::models::{
        CapType, CapabilityDef, ContextLevel, ContextNode, Permission, RiskMask, Subject,
    };

    use crate::config::AccessConfig;
    use crate::domain::error::DomainError;
    use crate::engine::AccessEngine;
    use crate::test_support::{StaticDirectory, build_engine};

    const TEACHER: i64 = 1;
    const STUDENT: i64 = 2;
    const AUDITOR: i64 = 3;

    const ALICE: i64 = 5;
    const BOB: i64 = 6;
    const CARA: i64 = 7;
    const DAVE: i64 = 8;
    const GUEST: i64 = 99;
    const ADMIN: i64 = 42;

    fn catalog() -> Vec<CapabilityDef> {
        vec![
            CapabilityDef {
                name: "x:view".to_owned(),
                captype: CapType::Read,
                context_level: ContextLevel::Course,
                risk: RiskMask::NONE,
                replaces: None,
            },
            CapabilityDef {
                name: "x:edit".to_owned(),
                captype: CapType::Write,
                context_level: ContextLevel::Course,
                risk: RiskMask::NONE,
                replaces: None,
            },
            CapabilityDef {
                name: "x:export".to_owned(),
                captype: CapType::Read,
                context_level: ContextLevel::Course,
                risk: RiskMask::DATALOSS,
                replaces: None,
            },
        ]
    }

    struct Fixture {
        engine: AccessEngine<StaticDirectory>,
        system: Arc<ContextNode>,
        category: Arc<ContextNode>,
        course: Arc<ContextNode>,
        module: Arc<ContextNode>,
        directory: Arc<StaticDirectory>,
    }

    /// System → Category(1) → Course(10) → Module(100) with the test
    /// catalog installed.
    async fn fixture(config: AccessConfig) -> Fixture {
        let (engine, directory, _db) = build_engine(config).await;
        directory.add_root(ContextLevel::Category, 1);
        directory.add_child(ContextLevel::Course, 10, (ContextLevel::Category, 1));
        directory.add_child(ContextLevel::Module, 100, (ContextLevel::Course, 10));

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let course = engine
            .contexts()
            .instance(ContextLevel::Course, 10, false)
            .await
            .unwrap();
        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();
        let system = engine.contexts().system().await.unwrap();

        engine
            .access()
            .update_capabilities("mod_x", &catalog())
            .await
            .unwrap();

        Fixture {
            engine,
            system,
            category,
            course,
            module,
            directory,
        }
    }

    // =========================================================================
    // baseline resolution
    // =========================================================================

    #[tokio::test]
    async fn unknown_scope_is_a_hard_error() {
        let f = fixture(AccessConfig::default()).await;
        let result = f
            .engine
            .access()
            .has_capability("x:view", 999_999, Subject::User(ALICE))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unknown_capability_is_false_not_an_error() {
        let f = fixture(AccessConfig::default()).await;
        let granted = f
            .engine
            .access()
            .has_capability("x:nonexistent", f.course.id, Subject::User(ALICE))
            .await
            .unwrap();
        assert!(!granted);
    }

    #[tokio::test]
    async fn no_explicit_grant_means_deny() {
        let f = fixture(AccessConfig::default()).await;
        // Role held, but no permission row anywhere on the path.
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        let granted = f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap();
        assert!(!granted);
    }

    #[tokio::test]
    async fn allow_at_an_ancestor_grants_below_but_not_above_the_assignment() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();

        let at_module = f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap();
        assert!(at_module);

        // The role is held at the course; it does not reach the category.
        let at_category = f
            .engine
            .access()
            .has_capability("x:view", f.category.id, Subject::User(ALICE))
            .await
            .unwrap();
        assert!(!at_category);
    }

    // =========================================================================
    // override stacking
    // =========================================================================

    #[tokio::test]
    async fn closest_scope_override_wins_per_role() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();

        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.module.id, Permission::Prevent)
            .await
            .unwrap();
        f.engine.roles().invalidate_subject_snapshots();

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
        // The course scope still resolves through the system Allow.
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn inherit_deletes_the_override_row() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.module.id, Permission::Prevent)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.module.id, Permission::Inherit)
            .await
            .unwrap();
        f.engine.roles().invalidate_subject_snapshots();

        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn prohibit_is_absolute_across_roles() {
        let f = fixture(AccessConfig::default()).await;
        // Three roles at the leaf: Allow, Prohibit, Allow.
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .set_override("x:view", STUDENT, f.module.id, Permission::Prohibit)
            .await
            .unwrap();
        f.engine
            .roles()
            .set_override("x:view", AUDITOR, f.module.id, Permission::Allow)
            .await
            .unwrap();
        for role in [TEACHER, STUDENT, AUDITOR] {
            f.engine.roles().assign(role, ALICE, f.module.id).await.unwrap();
        }

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    // =========================================================================
    // batch snapshot invalidation
    // =========================================================================

    #[tokio::test]
    async fn grant_changes_take_effect_after_the_batch_flush() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());

        // Revoking alone leaves the cached snapshot in place...
        f.engine
            .roles()
            .unassign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());

        // ...until the caller flushes once for the whole batch.
        f.engine.roles().invalidate_subject_snapshots();
        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn tree_mutation_forces_a_snapshot_reload_via_dirty_flags() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        // Revoke without flushing: the snapshot still answers.
        f.engine
            .roles()
            .unassign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        // A structural change marks the paths dirty; the stale snapshot
        // is rebuilt on the next check and the revoke becomes visible.
        f.directory.add_root(ContextLevel::Category, 2);
        let category2 = f
            .engine
            .contexts()
            .instance(ContextLevel::Category, 2, true)
            .await
            .unwrap();
        f.engine
            .contexts()
            .move_context(f.course.id, category2.id)
            .await
            .unwrap();

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    // =========================================================================
    // super admin and guest gates
    // =========================================================================

    #[tokio::test]
    async fn super_admin_bypasses_resolution_only_in_elevated_mode() {
        let config = AccessConfig {
            super_admins: vec![ADMIN],
            ..AccessConfig::default()
        };
        let f = fixture(config).await;

        assert!(f
            .engine
            .access()
            .has_capability("x:edit", f.module.id, Subject::User(ADMIN))
            .await
            .unwrap());

        // Without the elevated mode the admin is an ordinary subject
        // with no grants.
        assert!(!f
            .engine
            .access()
            .has_capability_with("x:edit", f.module.id, Subject::User(ADMIN), false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn guest_subjects_never_get_write_or_high_risk_capabilities() {
        let config = AccessConfig {
            guest_subject: Some(GUEST),
            ..AccessConfig::default()
        };
        let f = fixture(config).await;
        for capability in ["x:view", "x:edit", "x:export"] {
            f.engine
                .roles()
                .set_override(capability, AUDITOR, f.system.id, Permission::Allow)
                .await
                .unwrap();
        }
        f.engine
            .roles()
            .assign(AUDITOR, GUEST, f.course.id)
            .await
            .unwrap();

        // Low-risk read capability resolves normally.
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(GUEST))
            .await
            .unwrap());
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::Anonymous)
            .await
            .unwrap());

        // Write and high-risk capabilities are denied regardless of
        // the Allow rows.
        for subject in [Subject::User(GUEST), Subject::Anonymous] {
            assert!(!f
                .engine
                .access()
                .has_capability("x:edit", f.course.id, subject)
                .await
                .unwrap());
            assert!(!f
                .engine
                .access()
                .has_capability("x:export", f.course.id, subject)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn anonymous_without_a_guest_account_is_always_denied() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", AUDITOR, f.system.id, Permission::Allow)
            .await
            .unwrap();
        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::Anonymous)
            .await
            .unwrap());
    }

    // =========================================================================
    // role switching and temporary roles
    // =========================================================================

    #[tokio::test]
    async fn switch_replaces_effective_roles_at_and_below_the_scope() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:edit", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:edit", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine.roles().switch_role(ALICE, &f.course, Some(STUDENT));
        assert!(f.engine.roles().is_role_switched(ALICE, &f.course));
        assert!(!f
            .engine
            .access()
            .has_capability("x:edit", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine.roles().switch_role(ALICE, &f.course, None);
        assert!(!f.engine.roles().is_role_switched(ALICE, &f.course));
        assert!(f
            .engine
            .access()
            .has_capability("x:edit", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn temporary_roles_elevate_for_the_session_only() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", AUDITOR, f.system.id, Permission::Allow)
            .await
            .unwrap();

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine.roles().load_temporary_role(ALICE, &f.course, AUDITOR);
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
        // The elevation covers descendants of the scope too.
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.module.id, Subject::User(ALICE))
            .await
            .unwrap());
        // But not the scopes above it.
        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.category.id, Subject::User(ALICE))
            .await
            .unwrap());

        f.engine.roles().remove_temporary_roles(ALICE, &f.course);
        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    // =========================================================================
    // bulk query equivalence
    // =========================================================================

    #[tokio::test]
    async fn users_by_capability_matches_per_subject_resolution() {
        let config = AccessConfig {
            guest_subject: Some(GUEST),
            ..AccessConfig::default()
        };
        let f = fixture(config).await;

        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .set_override("x:view", AUDITOR, f.category.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .set_override("x:view", STUDENT, f.course.id, Permission::Prohibit)
            .await
            .unwrap();

        f.engine.roles().assign(TEACHER, ALICE, f.course.id).await.unwrap();
        f.engine.roles().assign(STUDENT, BOB, f.course.id).await.unwrap();
        f.engine.roles().assign(AUDITOR, CARA, f.category.id).await.unwrap();
        // Dave's Allow through the teacher role is killed by the
        // student Prohibit.
        f.engine.roles().assign(TEACHER, DAVE, f.course.id).await.unwrap();
        f.engine.roles().assign(STUDENT, DAVE, f.course.id).await.unwrap();
        f.engine.roles().assign(TEACHER, GUEST, f.course.id).await.unwrap();

        let bulk = f
            .engine
            .access()
            .users_by_capability(f.module.id, "x:view")
            .await
            .unwrap();

        for subject in [ALICE, BOB, CARA, DAVE] {
            let single = f
                .engine
                .access()
                .has_capability("x:view", f.module.id, Subject::User(subject))
                .await
                .unwrap();
            assert_eq!(
                bulk.contains(&subject),
                single,
                "bulk and per-subject resolution diverge for subject {subject}"
            );
        }
        assert_eq!(bulk, vec![ALICE, CARA]);

        // Guests are excluded from the bulk result even when their
        // role rows would pass.
        assert!(!bulk.contains(&GUEST));

        // Unknown capability yields an empty set, unknown scope an error.
        assert!(f
            .engine
            .access()
            .users_by_capability(f.module.id, "x:nonexistent")
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            f.engine.access().users_by_capability(999_999, "x:view").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    // =========================================================================
    // bulk unassignment
    // =========================================================================

    #[tokio::test]
    async fn unassign_all_removes_matching_grants_only() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine.roles().assign(TEACHER, ALICE, f.course.id).await.unwrap();
        f.engine.roles().assign(TEACHER, BOB, f.course.id).await.unwrap();

        let removed = f
            .engine
            .roles()
            .unassign_all(&crate::domain::repo::AssignmentFilter {
                subject_id: Some(ALICE),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        f.engine.roles().invalidate_subject_snapshots();

        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(BOB))
            .await
            .unwrap());

        // An unfiltered bulk unassignment is refused outright.
        let result = f
            .engine
            .roles()
            .unassign_all(&crate::domain::repo::AssignmentFilter::default())
            .await;
        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }

    // =========================================================================
    // the versioned client surface
    // =========================================================================

    #[tokio::test]
    async fn local_client_exposes_the_engine_contract() {
        use accesstree_sdk::{AccessError, AccessTreeClientV1};

        use crate::domain::local_client::LocalClient;

        let f = fixture(AccessConfig::default()).await;
        let client = LocalClient::new(Arc::new(f.engine));

        let course = client.context(ContextLevel::Course, 10).await.unwrap();
        assert_eq!(course.id, f.course.id);

        client.assign_role(TEACHER, ALICE, course.id).await.unwrap();
        client
            .set_override("x:view", TEACHER, course.id, Permission::Allow)
            .await
            .unwrap();
        assert!(client
            .has_capability("x:view", course.id, Subject::User(ALICE))
            .await
            .unwrap());
        assert_eq!(
            client.users_by_capability(course.id, "x:view").await.unwrap(),
            vec![ALICE]
        );

        client.unassign_role(TEACHER, ALICE, course.id).await.unwrap();
        client.reset_caches().await.unwrap();
        assert!(!client
            .has_capability("x:view", course.id, Subject::User(ALICE))
            .await
            .unwrap());

        let missing = client
            .has_capability("x:view", 999_999, Subject::User(ALICE))
            .await;
        assert!(matches!(missing, Err(AccessError::NotFound { .. })));
    }

    // =========================================================================
    // catalog sync
    // =========================================================================

    #[tokio::test]
    async fn catalog_sync_reports_installs_and_prunes_stale_rows() {
        let f = fixture(AccessConfig::default()).await;
        // The fixture installed three capabilities already; re-syncing
        // the same set changes nothing.
        let report = f
            .engine
            .access()
            .update_capabilities("mod_x", &catalog())
            .await
            .unwrap();
        assert_eq!(report.installed, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(report.removed, 0);
        assert!(report.failed.is_empty());

        // Dropping one definition prunes its row and its overrides.
        f.engine
            .roles()
            .set_override("x:export", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        let trimmed: Vec<_> = catalog()
            .into_iter()
            .filter(|def| def.name != "x:export")
            .collect();
        let report = f
            .engine
            .access()
            .update_capabilities("mod_x", &trimmed)
            .await
            .unwrap();
        assert_eq!(report.removed, 1);

        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(!f
            .engine
            .access()
            .has_capability("x:export", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn catalog_rename_preserves_override_rows() {
        let f = fixture(AccessConfig::default()).await;
        f.engine
            .roles()
            .set_override("x:view", TEACHER, f.system.id, Permission::Allow)
            .await
            .unwrap();
        f.engine
            .roles()
            .assign(TEACHER, ALICE, f.course.id)
            .await
            .unwrap();
        assert!(f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());

        let mut renamed = catalog();
        renamed[0].name = "x:see".to_owned();
        renamed[0].replaces = Some("x:view".to_owned());
        let report = f
            .engine
            .access()
            .update_capabilities("mod_x", &renamed)
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 0);

        // The grant carried over to the new name; the old name is gone
        // from the catalog.
        assert!(f
            .engine
            .access()
            .has_capability("x:see", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
        assert!(!f
            .engine
            .access()
            .has_capability("x:view", f.course.id, Subject::User(ALICE))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn catalog_sync_isolates_per_item_failures() {
        let f = fixture(AccessConfig::default()).await;
        let mut defs = vec![CapabilityDef {
            name: "y:one".to_owned(),
            captype: CapType::Read,
            context_level: ContextLevel::Course,
            risk: RiskMask::NONE,
            replaces: None,
        }];
        // A duplicate declaration trips the unique name constraint; the
        // batch must report it and keep going.
        defs.push(defs[0].clone());
        defs.push(CapabilityDef {
            name: "y:two".to_owned(),
            captype: CapType::Read,
            context_level: ContextLevel::Course,
            risk: RiskMask::NONE,
            replaces: None,
        });

        let report = f
            .engine
            .access()
            .update_capabilities("mod_y", &defs)
            .await
            .unwrap();
        assert_eq!(report.installed, 2);
        assert_eq!(report.failed, vec!["y:one".to_owned()]);
    }
}
