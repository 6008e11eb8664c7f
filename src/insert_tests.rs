#[cfg(test)]
mod tests {
    use crate::arg::SqlType;
    use crate::dialect::DuplicateStrategy;
    use crate::error::{Error, UsageError};
    use crate::flavor::{Flavor, set_default_flavor_scoped};
    use crate::insert::InsertBuilder;
    use crate::mapping::{FieldMapping, KeyPolicy, TableMapping};
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn user_mapping() -> TableMapping {
        TableMapping::for_map("tb_user")
            .with_field(FieldMapping::new("seq", "seq").primary_key(true))
            .with_field(FieldMapping::new("loginName", "login_name"))
            .with_field(FieldMapping::new("location", "location").sql_type(SqlType::Geometry))
            .with_field(FieldMapping::new("created", "created").insert(false))
    }

    fn row(pairs: &[(&str, SqlValue)]) -> BTreeMap<String, SqlValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn usage(err: Error) -> UsageError {
        match err {
            Error::Usage(e) => e,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn single_row_is_a_flat_statement() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([row(&[
            ("loginName", SqlValue::from("abc")),
            ("age", SqlValue::I64(18)),
        ])]);
        let bound = ib.bound_sql().unwrap();
        assert_eq!(bound.sql(), "INSERT INTO tb_user (age, login_name) VALUES (?, ?)");
        assert!(!bound.is_batch());
        assert_eq!(bound.values(), vec![SqlValue::I64(18), SqlValue::from("abc")]);
    }

    #[test]
    fn several_rows_share_one_statement() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([
            row(&[("loginName", SqlValue::from("a")), ("age", SqlValue::I64(1))]),
            row(&[("loginName", SqlValue::from("b"))]),
        ]);
        let bound = ib.bound_sql().unwrap();
        assert_eq!(bound.sql(), "INSERT INTO tb_user (age, login_name) VALUES (?, ?)");
        assert!(bound.is_batch());
        assert_eq!(
            bound.batch_values(),
            vec![
                vec![SqlValue::I64(1), SqlValue::from("a")],
                vec![SqlValue::Null, SqlValue::from("b")],
            ]
        );
        assert_eq!(ib.rows().len(), 2);
    }

    #[test]
    fn columns_not_insertable_are_left_out() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([row(&[
            ("created", SqlValue::from("2024-01-01")),
            ("loginName", SqlValue::from("a")),
        ])]);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT INTO tb_user (login_name) VALUES (?)"
        );

        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([row(&[("created", SqlValue::from("2024-01-01"))])]);
        assert_eq!(usage(ib.bound_sql().unwrap_err()), UsageError::NoInsertColumn);
    }

    #[test]
    fn nothing_to_insert() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let ib = InsertBuilder::for_map(user_mapping());
        assert_eq!(usage(ib.bound_sql().unwrap_err()), UsageError::NoInsertData);
    }

    #[test]
    fn two_properties_on_one_column() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([row(&[
            ("loginName", SqlValue::from("a")),
            ("login_name", SqlValue::from("b")),
        ])]);
        assert_eq!(
            usage(ib.bound_sql().unwrap_err()),
            UsageError::DuplicateColumn("login_name".to_string())
        );
    }

    fn keyed_row() -> BTreeMap<String, SqlValue> {
        row(&[("loginName", SqlValue::from("a")), ("seq", SqlValue::I64(7))])
    }

    #[test]
    fn mysql_duplicate_strategies() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([keyed_row()]).on_duplicate(DuplicateStrategy::Ignore);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT IGNORE INTO tb_user (login_name, seq) VALUES (?, ?)"
        );

        ib.on_duplicate(DuplicateStrategy::Update);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT INTO tb_user (login_name, seq) VALUES (?, ?) ON DUPLICATE KEY UPDATE login_name = VALUES(login_name), seq = VALUES(seq)"
        );
    }

    #[test]
    fn postgresql_upsert_uses_the_primary_key() {
        let _g = set_default_flavor_scoped(Flavor::PostgreSQL);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([keyed_row()]).on_duplicate(DuplicateStrategy::Update);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT INTO tb_user (login_name, seq) VALUES (?, ?) ON CONFLICT (seq) DO UPDATE SET (login_name, seq) = (EXCLUDED.login_name, EXCLUDED.seq)"
        );

        // 没有主键时无法生成 ON CONFLICT
        let mut ib = InsertBuilder::for_map(TableMapping::for_map("tb_log"));
        ib.apply_map([row(&[("msg", SqlValue::from("x"))])])
            .on_duplicate(DuplicateStrategy::Update);
        assert_eq!(
            usage(ib.bound_sql().unwrap_err()),
            UsageError::UnsupportedStrategy {
                flavor: Flavor::PostgreSQL,
                strategy: DuplicateStrategy::Update,
            }
        );
    }

    #[test]
    fn sql_server_only_plain_inserts() {
        let _g = set_default_flavor_scoped(Flavor::SQLServer);
        let mut ib = InsertBuilder::for_map(user_mapping());
        ib.apply_map([keyed_row()]);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT INTO tb_user (login_name, seq) VALUES (?, ?)"
        );

        ib.on_duplicate(DuplicateStrategy::Ignore);
        assert_eq!(
            usage(ib.bound_sql().unwrap_err()),
            UsageError::UnsupportedStrategy {
                flavor: Flavor::SQLServer,
                strategy: DuplicateStrategy::Ignore,
            }
        );

        assert_eq!(ib.set_flavor(Flavor::SQLite), Flavor::SQLServer);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT OR IGNORE INTO tb_user (login_name, seq) VALUES (?, ?)"
        );
    }

    #[test]
    fn geometry_and_insert_templates() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mapping = user_mapping()
            .with_field(FieldMapping::new("score", "score").insert_template("ROUND(?, 2)"));
        let mut ib = InsertBuilder::for_map(mapping);
        ib.apply_map([row(&[
            ("location", SqlValue::from("POINT(1 2)")),
            ("score", SqlValue::F64(1.234)),
        ])]);
        let bound = ib.bound_sql().unwrap();
        assert_eq!(
            bound.sql(),
            "INSERT INTO tb_user (location, score) VALUES (GeomFromText(?), ROUND(?, 2))"
        );
        assert_eq!(bound.flat_args().unwrap()[0].sql_type, SqlType::Geometry);
    }

    fn sequence_mapping(policy: KeyPolicy) -> TableMapping {
        TableMapping::for_map("tb_user")
            .with_field(FieldMapping::new("seq", "seq").primary_key(true).key_policy(policy))
            .with_field(FieldMapping::new("loginName", "login_name"))
    }

    #[test]
    fn keys_generated_before_insert() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let generator = KeyPolicy::Before(Arc::new(|field: &FieldMapping| -> Result<SqlValue, String> {
            assert_eq!(field.property, "seq");
            Ok(SqlValue::I64(42))
        }));
        let mut ib = InsertBuilder::for_map(sequence_mapping(generator));
        ib.apply_map([
            row(&[("loginName", SqlValue::from("a"))]),
            row(&[("loginName", SqlValue::from("b")), ("seq", SqlValue::I64(7))]),
            row(&[("loginName", SqlValue::from("c")), ("seq", SqlValue::Null)]),
        ]);
        let bound = ib.bound_sql().unwrap();
        assert_eq!(bound.sql(), "INSERT INTO tb_user (login_name, seq) VALUES (?, ?)");
        let keys: Vec<SqlValue> = ib
            .rows()
            .iter()
            .map(|r| r.get("seq").cloned().unwrap_or(SqlValue::Null))
            .collect();
        assert_eq!(keys, vec![SqlValue::I64(42), SqlValue::I64(7), SqlValue::I64(42)]);
    }

    #[test]
    fn key_generation_failure_surfaces_at_compile() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let generator = KeyPolicy::Before(Arc::new(|_: &FieldMapping| -> Result<SqlValue, String> {
            Err("sequence exhausted".to_string())
        }));
        let mut ib = InsertBuilder::for_map(sequence_mapping(generator));
        ib.apply_map([row(&[("loginName", SqlValue::from("a"))])]);
        assert_eq!(
            usage(ib.bound_sql().unwrap_err()),
            UsageError::KeyGeneration {
                property: "seq".to_string(),
                message: "sequence exhausted".to_string(),
            }
        );
    }

    #[test]
    fn keys_fetched_after_insert() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let policy = KeyPolicy::After {
            select_key: "SELECT LAST_INSERT_ID()".to_string(),
        };
        let mut ib = InsertBuilder::for_map(sequence_mapping(policy));
        ib.apply_map([
            row(&[("loginName", SqlValue::from("a"))]),
            row(&[("loginName", SqlValue::from("b")), ("seq", SqlValue::I64(7))]),
        ]);
        assert_eq!(
            ib.bound_sql().unwrap().sql(),
            "INSERT INTO tb_user (login_name, seq) VALUES (?, ?)"
        );

        let mut calls = Vec::new();
        let filled = ib
            .fill_generated_keys(&mut |select_key: &str, field: &FieldMapping| -> Result<SqlValue, String> {
                calls.push((select_key.to_string(), field.property.clone()));
                Ok(SqlValue::I64(100))
            })
            .unwrap();
        assert_eq!(filled, 1);
        assert_eq!(
            calls,
            vec![("SELECT LAST_INSERT_ID()".to_string(), "seq".to_string())]
        );
        let rows = ib.into_rows();
        assert_eq!(rows[0].get("seq"), Some(&SqlValue::I64(100)));
        assert_eq!(rows[1].get("seq"), Some(&SqlValue::I64(7)));
    }

    #[test]
    fn key_fetch_failure() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let policy = KeyPolicy::After {
            select_key: "SELECT LAST_INSERT_ID()".to_string(),
        };
        let mut ib = InsertBuilder::for_map(sequence_mapping(policy));
        ib.apply_map([row(&[("loginName", SqlValue::from("a"))])]);
        let err = ib
            .fill_generated_keys(&mut |_: &str, _: &FieldMapping| -> Result<SqlValue, String> {
                Err("connection lost".to_string())
            })
            .unwrap_err();
        assert_eq!(
            usage(err),
            UsageError::KeyGeneration {
                property: "seq".to_string(),
                message: "connection lost".to_string(),
            }
        );
    }
}
