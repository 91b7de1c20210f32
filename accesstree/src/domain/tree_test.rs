//! Integration tests for the scope-tree service.
//!
//! These run against an in-memory SQLite database with migrations
//! applied; the directory of domain instances is a static in-memory
//! fake registered per test.

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use accesstree_sdk::models::ContextLevel;

    use crate::config::AccessConfig;
    use crate::domain::dirty::DIRTY_FLAG_TYPE;
    use crate::domain::error::DomainError;
    use crate::domain::repo::{AssignmentRepository, ContextRepository, FlagRepository};
    use crate::infra::storage::assignment_repo::SeaOrmAssignmentRepository;
    use crate::infra::storage::context_repo::SeaOrmContextRepository;
    use crate::infra::storage::flag_repo::SeaOrmFlagRepository;
    use crate::test_support::{StaticDirectory, build_engine};

    /// Category(1) → Course(10) → Module(100), the standard fixture.
    fn seed_directory(directory: &StaticDirectory) {
        directory.add_root(ContextLevel::Category, 1);
        directory.add_child(ContextLevel::Course, 10, (ContextLevel::Category, 1));
        directory.add_child(ContextLevel::Module, 100, (ContextLevel::Course, 10));
    }

    // =========================================================================
    // instance lookup and creation
    // =========================================================================

    #[tokio::test]
    async fn instance_creates_the_full_parent_chain() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        assert_eq!(module.depth, 4);

        let system = engine.contexts().system().await.unwrap();
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

        assert_eq!(module.path.segments()[0], system.id);
        assert_eq!(module.parent_id(), Some(course.id));
        assert_eq!(course.parent_id(), Some(category.id));
        assert_eq!(category.parent_id(), Some(system.id));
    }

    #[tokio::test]
    async fn instance_without_create_is_not_found() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let result = engine
            .contexts()
            .instance(ContextLevel::Course, 10, false)
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn system_context_is_a_singleton() {
        let (engine, _directory, _db) = build_engine(AccessConfig::default()).await;

        let first = engine.contexts().system().await.unwrap();
        let second = engine.contexts().system().await.unwrap();
        assert_eq!(first.id, second.id);

        let result = engine
            .contexts()
            .instance(ContextLevel::System, 5, true)
            .await;
        assert!(matches!(result, Err(DomainError::Integrity(_))));
    }

    // =========================================================================
    // navigation
    // =========================================================================

    #[tokio::test]
    async fn ancestors_are_ordered_nearest_first() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let with_self = engine.contexts().ancestors(&module, true).await.unwrap();
        let levels: Vec<ContextLevel> = with_self.iter().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![
                ContextLevel::Module,
                ContextLevel::Course,
                ContextLevel::Category,
                ContextLevel::System,
            ]
        );

        let without_self = engine.contexts().ancestors(&module, false).await.unwrap();
        assert_eq!(without_self.len(), 3);
        assert_eq!(without_self[0].level, ContextLevel::Course);
    }

    #[tokio::test]
    async fn course_ancestor_walks_up_to_the_course_scope() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let course = engine
            .contexts()
            .course_ancestor(&module, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(course.level, ContextLevel::Course);
        assert_eq!(course.instance_id, 10);

        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();
        assert!(engine
            .contexts()
            .course_ancestor(&category, false)
            .await
            .unwrap()
            .is_none());
        let result = engine.contexts().course_ancestor(&category, true).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn descendants_come_from_a_single_prefix_query() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();

        let found = engine.contexts().descendants(&category).await.unwrap();
        let ids: HashSet<i64> = found.iter().map(|n| n.id).collect();
        assert_eq!(found.len(), 2);
        assert!(ids.contains(&module.id));
        assert!(ids.contains(&module.parent_id().unwrap()));
    }

    // =========================================================================
    // move
    // =========================================================================

    #[tokio::test]
    async fn move_rewrites_subtree_paths_and_marks_both_paths_dirty() {
        let (engine, directory, db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);
        directory.add_root(ContextLevel::Category, 2);

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
        let category2 = engine
            .contexts()
            .instance(ContextLevel::Category, 2, true)
            .await
            .unwrap();
        let old_course_path = course.path.clone();

        engine
            .contexts()
            .move_context(course.id, category2.id)
            .await
            .unwrap();

        let course_after = engine.contexts().instance_by_id(course.id).await.unwrap();
        let module_after = engine.contexts().instance_by_id(module.id).await.unwrap();
        assert!(category2.path.is_or_contains(&course_after.path));
        assert!(course_after.path.is_or_contains(&module_after.path));
        assert_eq!(course_after.depth, 3);
        assert_eq!(module_after.depth, 4);

        let flags = SeaOrmFlagRepository::new()
            .all(&db, DIRTY_FLAG_TYPE)
            .await
            .unwrap();
        let names: HashSet<String> = flags.into_iter().map(|f| f.name).collect();
        assert!(names.contains(&old_course_path.to_string()));
        assert!(names.contains(&course_after.path.to_string()));
    }

    #[tokio::test]
    async fn move_to_the_current_parent_is_a_noop() {
        let (engine, directory, db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let course = engine
            .contexts()
            .instance(ContextLevel::Course, 10, true)
            .await
            .unwrap();
        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();

        engine
            .contexts()
            .move_context(course.id, category.id)
            .await
            .unwrap();

        let after = engine.contexts().instance_by_id(course.id).await.unwrap();
        assert_eq!(after.path, course.path);
        let flags = SeaOrmFlagRepository::new()
            .all(&db, DIRTY_FLAG_TYPE)
            .await
            .unwrap();
        assert!(flags.is_empty());
    }

    #[tokio::test]
    async fn move_under_the_own_subtree_is_rejected() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();

        let result = engine.contexts().move_context(category.id, module.id).await;
        assert!(matches!(result, Err(DomainError::Integrity(_))));
    }

    // =========================================================================
    // delete
    // =========================================================================

    #[tokio::test]
    async fn delete_cascades_to_descendants_grants_and_cache() {
        let (engine, directory, db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

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
        engine.roles().assign(1, 5, module.id).await.unwrap();

        engine.contexts().delete_context(course.id).await.unwrap();

        let by_instance = engine
            .contexts()
            .instance(ContextLevel::Module, 100, false)
            .await;
        assert!(matches!(by_instance, Err(DomainError::NotFound { .. })));
        let by_id = engine.contexts().instance_by_id(module.id).await;
        assert!(matches!(by_id, Err(DomainError::NotFound { .. })));

        let grants = SeaOrmAssignmentRepository::new()
            .for_subject(&db, 5)
            .await
            .unwrap();
        assert!(grants.is_empty());

        let flags = SeaOrmFlagRepository::new()
            .all(&db, DIRTY_FLAG_TYPE)
            .await
            .unwrap();
        assert!(flags.iter().any(|f| f.name == course.path.to_string()));

        // Re-instantiation starts from a fresh row with a fresh path.
        let module_again = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        assert_ne!(module_again.id, module.id);
        assert_eq!(module_again.depth, 4);
    }

    #[tokio::test]
    async fn deleting_the_system_context_is_rejected() {
        let (engine, _directory, _db) = build_engine(AccessConfig::default()).await;
        let system = engine.contexts().system().await.unwrap();
        let result = engine.contexts().delete_context(system.id).await;
        assert!(matches!(result, Err(DomainError::Integrity(_))));
    }

    // =========================================================================
    // reset + rebuild
    // =========================================================================

    #[tokio::test]
    async fn rebuild_restores_reset_paths_and_is_idempotent() {
        let (engine, directory, db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let category = engine
            .contexts()
            .instance(ContextLevel::Category, 1, false)
            .await
            .unwrap();
        let course_id = engine
            .contexts()
            .instance(ContextLevel::Course, 10, false)
            .await
            .unwrap()
            .id;

        let repo = SeaOrmContextRepository::new();
        let before: HashMap<i64, (Option<String>, i32)> = repo
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, (r.path, r.depth)))
            .collect();

        engine
            .contexts()
            .reset_paths(category.id, true)
            .await
            .unwrap();
        let pending = engine.contexts().instance_by_id(course_id).await;
        assert!(matches!(pending, Err(DomainError::Configuration(_))));

        let updated = engine.contexts().rebuild_all_paths().await.unwrap();
        assert!(updated >= 3);

        let after: HashMap<i64, (Option<String>, i32)> = repo
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.id, (r.path, r.depth)))
            .collect();
        assert_eq!(before, after);

        // Second run finds nothing to do.
        assert_eq!(engine.contexts().rebuild_all_paths().await.unwrap(), 0);
    }

    // =========================================================================
    // orphan cleanup and preloading
    // =========================================================================

    #[tokio::test]
    async fn cleanup_removes_contexts_whose_instance_is_gone() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        directory.remove(ContextLevel::Module, 100);

        let removed = engine.contexts().cleanup_orphans().await.unwrap();
        assert_eq!(removed, 1);

        let result = engine
            .contexts()
            .instance(ContextLevel::Module, 100, false)
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        assert!(engine
            .contexts()
            .instance(ContextLevel::Course, 10, false)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn preload_hydrates_many_contexts_at_once() {
        let (engine, directory, _db) = build_engine(AccessConfig::default()).await;
        seed_directory(&directory);

        let module = engine
            .contexts()
            .instance(ContextLevel::Module, 100, true)
            .await
            .unwrap();
        let ids: Vec<i64> = module.path.segments().to_vec();

        engine.contexts().reset_caches();
        assert_eq!(engine.contexts().cache().len(), 0);

        let loaded = engine.contexts().preload_by_ids(&ids).await.unwrap();
        assert_eq!(loaded.len(), ids.len());
        assert_eq!(engine.contexts().cache().len(), ids.len());
    }
}
