#[cfg(test)]
mod tests {
    use crate::arg::SqlType;
    use crate::error::{BindingError, DefinitionError, Error};
    use crate::flavor::Flavor;
    use crate::node::Node;
    use crate::param::ParamContext;
    use crate::registry::{
        KeyOrder, Registry, ResultMapping, SelectKey, StatementDefinition, StatementKind,
    };
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn stmt(id: &str, src: &str) -> StatementDefinition {
        StatementDefinition::new("user", id, StatementKind::Select, vec![Node::text(src).unwrap()])
    }

    #[test]
    fn evaluate_by_qualified_id() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        assert!(registry.is_empty());
        registry
            .register(stmt("byId", "select * from tb_user where id = #{id}"))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("user.byId"));
        assert!(!registry.contains("byId"));

        let bound = registry
            .evaluate("user.byId", &ParamContext::new().with("id", 9))
            .unwrap();
        assert_eq!(bound.sql(), "select * from tb_user where id = ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(9)]);

        assert_eq!(
            registry.evaluate("user.nope", &ParamContext::new()).unwrap_err(),
            Error::Binding(BindingError::UnknownStatement("user.nope".to_string()))
        );
    }

    #[test]
    fn statement_text_is_kept_verbatim() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register(stmt("multi", "\n  select *\n  from tb_user\n  where id = #{id}\n"))
            .unwrap();
        let bound = registry
            .evaluate("user.multi", &ParamContext::new().with("id", 1))
            .unwrap();
        assert_eq!(bound.sql(), "\n  select *\n  from tb_user\n  where id = ?\n");
    }

    #[test]
    fn empty_namespace_uses_the_bare_id() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register(StatementDefinition::new(
                "",
                "ping",
                StatementKind::Execute,
                vec![Node::text("select 1").unwrap()],
            ))
            .unwrap();
        assert!(registry.contains("ping"));
        assert_eq!(registry.evaluate("ping", &ParamContext::new()).unwrap().sql(), "select 1");
    }

    #[test]
    fn duplicate_ids_are_rejected_atomically() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry.register(stmt("a", "select 1")).unwrap();

        let err = registry
            .register_all([stmt("b", "select 2"), stmt("a", "select 3")])
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateStatement("user.a".to_string()));
        assert!(!registry.contains("user.b"));

        let err = registry
            .register_all([stmt("c", "select 1"), stmt("c", "select 2")])
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateStatement("user.c".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_fragments_and_macros() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register_fragment("user", "cols", vec![Node::text("id").unwrap()])
            .unwrap();
        assert_eq!(
            registry
                .register_fragment("user", "cols", vec![Node::text("name").unwrap()])
                .unwrap_err(),
            DefinitionError::DuplicateFragment("user.cols".to_string())
        );
        // 不同命名空间可以同名
        registry
            .register_fragment("order", "cols", vec![Node::text("id").unwrap()])
            .unwrap();

        registry.register_macro("cols", "id, name").unwrap();
        assert_eq!(
            registry.register_macro("cols", "id").unwrap_err(),
            DefinitionError::DuplicateMacro("cols".to_string())
        );
        assert!(matches!(
            registry.register_macro("broken", "id = #{id").unwrap_err(),
            DefinitionError::Syntax { .. }
        ));
    }

    #[test]
    fn not_null_property_from_nullable_column_fails_to_load() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        let bad = stmt("find", "select age from tb_user").with_result_mapping(
            ResultMapping::new("age", "age", SqlType::Integer)
                .not_null()
                .nullable_column(),
        );
        let err = registry
            .register_all([stmt("ok", "select 1"), bad])
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::NullableConflict {
                statement: "user.find".to_string(),
                property: "age".to_string(),
                column: "age".to_string(),
            }
        );
        assert!(registry.is_empty());

        // 可空属性接收可空列没有问题
        let fine = stmt("find", "select age from tb_user")
            .with_result_mapping(ResultMapping::new("age", "age", SqlType::Integer).nullable_column());
        registry.register(fine).unwrap();
    }

    #[test]
    fn incompatible_result_types_fail_to_load() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        let bad = stmt("find", "select created from tb_user").with_result_mapping(
            ResultMapping::new("created", "created", SqlType::Timestamp).column_type(SqlType::Blob),
        );
        assert_eq!(
            registry.register(bad).unwrap_err(),
            DefinitionError::IncompatibleType {
                name: "created".to_string(),
                declared: SqlType::Blob,
                actual: SqlType::Timestamp,
            }
        );

        let widened = stmt("find", "select age from tb_user").with_result_mapping(
            ResultMapping::new("age", "age", SqlType::BigInt).column_type(SqlType::Integer),
        );
        registry.register(widened).unwrap();
    }

    #[test]
    fn statement_metadata_is_kept() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        let def = StatementDefinition::new(
            "user",
            "insert",
            StatementKind::Insert,
            vec![Node::text("insert into tb_user (name) values (#{name})").unwrap()],
        )
        .with_result_type("int")
        .with_timeout(Duration::from_secs(5))
        .with_fetch_size(100)
        .with_generated_keys("id", Some("user_id".to_string()));
        registry.register(def).unwrap();

        let def = registry.statement("user.insert").unwrap();
        assert_eq!(def.namespace(), "user");
        assert_eq!(def.id(), "insert");
        assert_eq!(def.qualified_id(), "user.insert");
        assert_eq!(def.kind(), StatementKind::Insert);
        assert_eq!(def.result_type(), Some("int"));
        assert_eq!(def.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(def.fetch_size(), Some(100));
        assert!(def.use_generated_keys());
        assert_eq!(def.key_property(), Some("id"));
        assert_eq!(def.key_column(), Some("user_id"));
        assert!(def.select_key().is_none());
        assert_eq!(def.body().len(), 1);
        assert!(registry.statement("user.missing").is_none());
    }

    #[test]
    fn select_key_is_evaluated_separately() {
        let mut registry = Registry::for_flavor(Flavor::PostgreSQL);
        let key = SelectKey::new(
            "id",
            KeyOrder::Before,
            vec![Node::text("select nextval(#{seq})").unwrap()],
        )
        .key_column("id")
        .result_type(SqlType::BigInt);
        registry
            .register_all([
                StatementDefinition::new(
                    "user",
                    "insert",
                    StatementKind::Insert,
                    vec![Node::text("insert into tb_user (id, name) values (#{id}, #{name})").unwrap()],
                )
                .with_select_key(key),
                stmt("plain", "select 1"),
            ])
            .unwrap();

        let ctx = ParamContext::new().with("seq", "user_seq");
        let (order, bound) = registry
            .evaluate_select_key("user.insert", &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(order, KeyOrder::Before);
        assert_eq!(bound.sql(), "select nextval(?)");
        assert_eq!(bound.values(), vec![SqlValue::from("user_seq")]);

        let def = registry.statement("user.insert").unwrap();
        let key = def.select_key().unwrap();
        assert_eq!(key.key_property, "id");
        assert_eq!(key.key_column.as_deref(), Some("id"));
        assert_eq!(key.result_type, Some(SqlType::BigInt));

        assert!(registry.evaluate_select_key("user.plain", &ctx).unwrap().is_none());
        assert!(registry.evaluate_select_key("user.none", &ctx).is_err());
    }

    #[test]
    fn registry_uses_its_dialect() {
        let registry = Registry::for_flavor(Flavor::PostgreSQL);
        assert_eq!(registry.dialect().flavor(), Flavor::PostgreSQL);
        let _g = crate::flavor::set_default_flavor_scoped(Flavor::SQLite);
        assert_eq!(Registry::new().dialect().flavor(), Flavor::SQLite);
    }

    #[test]
    fn evaluation_is_repeatable_and_shareable() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register(stmt("byName", "select * from t where name = :name"))
            .unwrap();
        let registry = std::sync::Arc::new(registry);

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .evaluate("user.byName", &ParamContext::new().with("name", name))
                        .unwrap()
                })
            })
            .collect();
        for (handle, name) in handles.into_iter().zip(["a", "b", "c"]) {
            let bound = handle.join().unwrap();
            assert_eq!(bound.sql(), "select * from t where name = ?");
            assert_eq!(bound.values(), vec![SqlValue::from(name)]);
        }
    }
}
