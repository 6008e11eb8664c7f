#[cfg(test)]
mod tests {
    use crate::dialect::MySqlDialect;
    use crate::error::{BindingError, Error};
    use crate::flavor::Flavor;
    use crate::node::{Foreach, Node, Trim};
    use crate::param::{ParamContext, ParamValue};
    use crate::registry::{Registry, StatementDefinition, StatementKind};
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn text(src: &str) -> Node {
        Node::text(src).unwrap()
    }

    fn select(body: Vec<Node>) -> StatementDefinition {
        StatementDefinition::new("user", "find", StatementKind::Select, body)
    }

    fn user_filter() -> StatementDefinition {
        select(vec![
            text("select * from tb_user"),
            Node::where_(vec![
                Node::if_("name != null", vec![text(" AND name = #{name}")]).unwrap(),
                Node::if_("age != null", vec![text(" AND age > #{age}")]).unwrap(),
            ]),
        ])
    }

    #[test]
    fn where_strips_the_leading_connective() {
        let def = user_filter();

        let bound = def
            .evaluate(&ParamContext::new().with("age", 18), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from tb_user WHERE age > ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(18)]);

        let bound = def
            .evaluate(&ParamContext::new().with("name", "abc").with("age", 18), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from tb_user WHERE name = ? AND age > ?");

        let bound = def
            .evaluate(&ParamContext::new().with("name", ParamValue::null()), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from tb_user");
        assert!(bound.values().is_empty());
    }

    #[test]
    fn trim_overrides_respect_word_boundaries_and_case() {
        let def = select(vec![
            text("select * from t"),
            Node::where_(vec![text(" order_no = #{n}")]),
        ]);
        let bound = def
            .evaluate(&ParamContext::new().with("n", 1), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from t WHERE order_no = ?");

        let def = select(vec![
            text("select * from t"),
            Node::where_(vec![text(" and a = 1 or")]),
        ]);
        let bound = def.evaluate(&ParamContext::new(), &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "select * from t WHERE a = 1");
    }

    #[test]
    fn set_strips_the_trailing_comma() {
        let def = StatementDefinition::new(
            "user",
            "update",
            StatementKind::Update,
            vec![
                text("update tb_user"),
                Node::set(vec![
                    Node::if_("name != null", vec![text(" name = #{name},")]).unwrap(),
                    Node::if_("age != null", vec![text(" age = #{age},")]).unwrap(),
                ]),
                text(" where id = #{id}"),
            ],
        );
        let ctx = ParamContext::new().with("name", "abc").with("id", 3);
        let bound = def.evaluate(&ctx, &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "update tb_user SET name = ? where id = ?");
        assert_eq!(bound.values(), vec![SqlValue::from("abc"), SqlValue::I64(3)]);
    }

    #[test]
    fn custom_trim_with_prefix_and_suffix() {
        let trim = Trim::new()
            .prefix("(")
            .suffix(")")
            .prefix_overrides(["OR"])
            .suffix_overrides(["OR"]);
        let def = select(vec![
            text("select * from t where"),
            Node::trim(trim.clone(), vec![text(" OR a = 1 OR b = 2 OR ")]),
        ]);
        let bound = def.evaluate(&ParamContext::new(), &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "select * from t where ( a = 1 OR b = 2 )");

        let def = select(vec![text("select * from t"), Node::trim(trim, vec![text("  OR ")])]);
        let bound = def.evaluate(&ParamContext::new(), &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "select * from t");
    }

    #[test]
    fn choose_takes_the_first_true_branch() {
        let def = select(vec![
            text("select * from t where "),
            Node::choose(
                vec![
                    ("kind == 'a'", vec![text("a = 1")]),
                    ("kind == 'b' || kind == 'a'", vec![text("b = 2")]),
                ],
                Some(vec![text("c = 3")]),
            )
            .unwrap(),
        ]);
        let sql = |kind: &'static str| {
            def.evaluate(&ParamContext::new().with("kind", kind), &MySqlDialect)
                .unwrap()
                .sql()
                .to_string()
        };
        assert_eq!(sql("a"), "select * from t where a = 1");
        assert_eq!(sql("b"), "select * from t where b = 2");
        assert_eq!(sql("z"), "select * from t where c = 3");
    }

    fn in_list() -> StatementDefinition {
        select(vec![
            text("select * from t where id in "),
            Foreach::new("ids")
                .unwrap()
                .item("id")
                .open("(")
                .close(")")
                .separator(", ")
                .children(vec![text("#{id}")])
                .into(),
        ])
    }

    #[test]
    fn foreach_over_a_list() {
        let bound = in_list()
            .evaluate(&ParamContext::new().with("ids", vec![3, 5, 8]), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from t where id in (?, ?, ?)");
        assert_eq!(
            bound.values(),
            vec![SqlValue::I64(3), SqlValue::I64(5), SqlValue::I64(8)]
        );
    }

    #[test]
    fn foreach_over_nothing_omits_open_and_close() {
        let def = in_list();
        let empty = def
            .evaluate(&ParamContext::new().with("ids", Vec::<i64>::new()), &MySqlDialect)
            .unwrap();
        assert_eq!(empty.sql(), "select * from t where id in ");

        let absent = def.evaluate(&ParamContext::new(), &MySqlDialect).unwrap();
        assert_eq!(absent.sql(), "select * from t where id in ");

        let null = def
            .evaluate(&ParamContext::new().with("ids", ParamValue::null()), &MySqlDialect)
            .unwrap();
        assert!(null.values().is_empty());
    }

    #[test]
    fn foreach_over_a_scalar_is_an_error() {
        let err = in_list()
            .evaluate(&ParamContext::new().with("ids", 7), &MySqlDialect)
            .unwrap_err();
        assert_eq!(err, Error::Binding(BindingError::NotIterable("ids".to_string())));
    }

    #[test]
    fn foreach_over_a_map_binds_keys() {
        let mut filters = BTreeMap::new();
        filters.insert("age".to_string(), ParamValue::value(18));
        filters.insert("name".to_string(), ParamValue::value("abc"));
        let def = select(vec![
            text("select * from t where "),
            Foreach::new("filters")
                .unwrap()
                .item("v")
                .index("k")
                .separator(" and ")
                .children(vec![text("${k} = #{v}")])
                .into(),
        ]);
        let bound = def
            .evaluate(&ParamContext::new().with("filters", filters), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from t where age = ? and name = ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(18), SqlValue::from("abc")]);
    }

    #[test]
    fn foreach_skips_empty_iterations() {
        let def = select(vec![
            text("select * from t where "),
            Foreach::new("ids")
                .unwrap()
                .item("id")
                .index("i")
                .separator(" or ")
                .children(vec![Node::if_("i > 0", vec![text("id = #{id}")]).unwrap()])
                .into(),
        ]);
        let bound = def
            .evaluate(&ParamContext::new().with("ids", vec![1, 2, 3]), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.sql(), "select * from t where id = ? or id = ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(2), SqlValue::I64(3)]);
    }

    #[test]
    fn bind_is_visible_to_later_siblings_only() {
        let def = select(vec![
            Node::bind("pattern", "'%' + name + '%'").unwrap(),
            text("select * from t where name like #{pattern}"),
        ]);
        let bound = def
            .evaluate(&ParamContext::new().with("name", "ab"), &MySqlDialect)
            .unwrap();
        assert_eq!(bound.values(), vec![SqlValue::from("%ab%")]);

        let before = select(vec![
            text("select * from t where name like #{pattern}"),
            Node::bind("pattern", "name").unwrap(),
        ]);
        let err = before
            .evaluate(&ParamContext::new().with("name", "ab"), &MySqlDialect)
            .unwrap_err();
        assert_eq!(err, Error::Binding(BindingError::Unresolved("pattern".to_string())));

        let nested = select(vec![
            Node::if_("true", vec![Node::bind("pattern", "name").unwrap()]).unwrap(),
            text("select #{pattern}"),
        ]);
        let err = nested
            .evaluate(&ParamContext::new().with("name", "ab"), &MySqlDialect)
            .unwrap_err();
        assert_eq!(err, Error::Binding(BindingError::Unresolved("pattern".to_string())));
    }

    #[test]
    fn positional_markers_are_numbered_across_nodes() {
        let def = select(vec![
            text("select * from t where a = ?"),
            Node::if_("flag", vec![text(" and b = ?")]).unwrap(),
            text(" and c = ?"),
        ]);
        let ctx = ParamContext::positional([10, 20, 30]).with("flag", true);
        let bound = def.evaluate(&ctx, &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "select * from t where a = ? and b = ? and c = ?");
        assert_eq!(
            bound.values(),
            vec![SqlValue::I64(10), SqlValue::I64(20), SqlValue::I64(30)]
        );

        let ctx = ParamContext::positional([10, 20, 30]).with("flag", false);
        let bound = def.evaluate(&ctx, &MySqlDialect).unwrap();
        assert_eq!(bound.values(), vec![SqlValue::I64(10), SqlValue::I64(30)]);
    }

    #[test]
    fn included_fragments_continue_the_positional_numbering() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register_fragment("user", "byB", vec![text(" and b = ?")])
            .unwrap();
        registry.register_macro("byC", " and c = ?").unwrap();
        registry
            .register(select(vec![
                text("select * from t where a = ?"),
                Node::include("byB"),
                Node::macro_ref("byC"),
                text(" and d = ?@{macro, byC}"),
            ]))
            .unwrap();
        let bound = registry
            .evaluate("user.find", &ParamContext::positional([1, 2, 3, 4, 5]))
            .unwrap();
        assert_eq!(
            bound.sql(),
            "select * from t where a = ? and b = ? and c = ? and d = ? and c = ?"
        );
        assert_eq!(
            bound.values(),
            (1..=5).map(SqlValue::I64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn skipped_branches_keep_their_positional_slots() {
        let def = select(vec![
            text("select * from t where "),
            Node::choose(
                vec![
                    ("kind == 'a'", vec![text("a = ?")]),
                    ("kind == 'b'", vec![text("b = ?")]),
                ],
                Some(vec![text("c = ?")]),
            )
            .unwrap(),
            Foreach::new("ids")
                .unwrap()
                .item("id")
                .open(" and id in (")
                .close(")")
                .separator(", ")
                .children(vec![text("#{id} + ?")])
                .into(),
            text(" and e = ?"),
        ]);
        let ctx = ParamContext::positional([10, 20, 30, 40, 50])
            .with("kind", "b")
            .with("ids", vec![7, 8]);
        let bound = def.evaluate(&ctx, &MySqlDialect).unwrap();
        assert_eq!(
            bound.sql(),
            "select * from t where b = ? and id in (? + ?, ? + ?) and e = ?"
        );
        assert_eq!(
            bound.values(),
            vec![
                SqlValue::I64(20),
                SqlValue::I64(7),
                SqlValue::I64(40),
                SqlValue::I64(8),
                SqlValue::I64(40),
                SqlValue::I64(50),
            ]
        );

        let ctx = ParamContext::positional([10, 20, 30, 40, 50]).with("kind", "z");
        let bound = def.evaluate(&ctx, &MySqlDialect).unwrap();
        assert_eq!(bound.sql(), "select * from t where c = ? and e = ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(30), SqlValue::I64(50)]);
    }

    fn registry_with_columns() -> Registry {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry
            .register_fragment("user", "columns", vec![text("id, name, age")])
            .unwrap();
        registry
    }

    #[test]
    fn include_resolves_in_the_statement_namespace() {
        let mut registry = registry_with_columns();
        registry
            .register_all([
                select(vec![
                    text("select "),
                    Node::include("columns"),
                    text(" from tb_user"),
                ]),
                StatementDefinition::new(
                    "report",
                    "users",
                    StatementKind::Select,
                    vec![text("select "), Node::include("user.columns"), text(" from tb_user")],
                ),
            ])
            .unwrap();

        let ctx = ParamContext::new();
        assert_eq!(
            registry.evaluate("user.find", &ctx).unwrap().sql(),
            "select id, name, age from tb_user"
        );
        assert_eq!(
            registry.evaluate("report.users", &ctx).unwrap().sql(),
            "select id, name, age from tb_user"
        );
    }

    #[test]
    fn include_failures() {
        let mut registry = registry_with_columns();
        registry
            .register_fragment("user", "loop", vec![text("x "), Node::include("loop")])
            .unwrap();
        registry
            .register_all([
                StatementDefinition::new("user", "a", StatementKind::Select, vec![Node::include("loop")]),
                StatementDefinition::new("user", "b", StatementKind::Select, vec![Node::include("nope")]),
            ])
            .unwrap();

        let ctx = ParamContext::new();
        assert_eq!(
            registry.evaluate("user.a", &ctx).unwrap_err(),
            Error::Binding(BindingError::RecursiveInclude("user.loop".to_string()))
        );
        assert_eq!(
            registry.evaluate("user.b", &ctx).unwrap_err(),
            Error::Binding(BindingError::UnknownFragment("user.nope".to_string()))
        );

        // 没有注册表时片段不可用
        let bare = select(vec![Node::include("columns")]);
        assert_eq!(
            bare.evaluate(&ctx, &MySqlDialect).unwrap_err(),
            Error::Binding(BindingError::UnknownFragment("user.columns".to_string()))
        );
    }

    #[test]
    fn the_same_fragment_may_be_included_twice() {
        let mut registry = registry_with_columns();
        registry
            .register(select(vec![
                text("select "),
                Node::include("columns"),
                text(" from a union select "),
                Node::include("columns"),
                text(" from b"),
            ]))
            .unwrap();
        let bound = registry.evaluate("user.find", &ParamContext::new()).unwrap();
        assert_eq!(
            bound.sql(),
            "select id, name, age from a union select id, name, age from b"
        );
    }

    #[test]
    fn macros_expand_in_text_and_as_nodes() {
        let mut registry = Registry::for_flavor(Flavor::MySQL);
        registry.register_macro("columns", "id, name").unwrap();
        registry.register_macro("byName", "name = :name").unwrap();
        registry
            .register_all([
                select(vec![text("select @{macro, columns} from t where @{macro,byName}")]),
                StatementDefinition::new(
                    "user",
                    "node",
                    StatementKind::Select,
                    vec![text("select * from t where "), Node::macro_ref("byName")],
                ),
            ])
            .unwrap();

        let ctx = ParamContext::new().with("name", "abc");
        let bound = registry.evaluate("user.find", &ctx).unwrap();
        assert_eq!(bound.sql(), "select id, name from t where name = ?");
        assert_eq!(bound.values(), vec![SqlValue::from("abc")]);

        let bound = registry.evaluate("user.node", &ctx).unwrap();
        assert_eq!(bound.sql(), "select * from t where name = ?");

        let err = select(vec![Node::macro_ref("byName")])
            .evaluate(&ctx, &MySqlDialect)
            .unwrap_err();
        assert_eq!(err, Error::Binding(BindingError::UnknownMacro("byName".to_string())));
    }
}
