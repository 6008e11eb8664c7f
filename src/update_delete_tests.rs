#[cfg(test)]
mod tests {
    use crate::arg::SqlType;
    use crate::criteria::Compare;
    use crate::delete::DeleteBuilder;
    use crate::error::{Error, UsageError};
    use crate::flavor::{Flavor, set_default_flavor_scoped};
    use crate::mapping::{FieldMapping, TableMapping};
    use crate::update::UpdateBuilder;
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn user_mapping() -> TableMapping {
        TableMapping::for_map("tb_user")
            .with_field(FieldMapping::new("seq", "seq").primary_key(true))
            .with_field(FieldMapping::new("loginName", "login_name"))
            .with_field(FieldMapping::new("location", "location").sql_type(SqlType::Geometry))
            .with_field(FieldMapping::new("created", "created").update(false))
            .with_field(FieldMapping::new("visits", "visits").set_value_template("visits + ?"))
    }

    fn update() -> UpdateBuilder {
        UpdateBuilder::for_map(user_mapping())
    }

    fn usage(err: Error) -> UsageError {
        match err {
            Error::Usage(e) => e,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn update_with_where() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("loginName", "abc").update_to("age", 18).eq("seq", 1);
        let bound = u.bound_sql().unwrap();
        assert_eq!(bound.sql(), "UPDATE tb_user SET login_name = ? , age = ? WHERE seq = ?");
        assert_eq!(
            bound.values(),
            vec![SqlValue::from("abc"), SqlValue::I64(18), SqlValue::I64(1)]
        );
    }

    #[test]
    fn update_without_where_needs_opt_in() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("age", 18);
        assert_eq!(usage(u.bound_sql().unwrap_err()), UsageError::EmptyWhere("update"));

        u.allow_empty_where();
        assert_eq!(u.bound_sql().unwrap().sql(), "UPDATE tb_user SET age = ?");
    }

    #[test]
    fn update_needs_something_to_set() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.eq("seq", 1);
        assert_eq!(usage(u.bound_sql().unwrap_err()), UsageError::NothingToUpdate);

        // 不可更新的列被忽略
        u.update_to("created", "2024-01-01");
        assert_eq!(usage(u.bound_sql().unwrap_err()), UsageError::NothingToUpdate);
    }

    #[test]
    fn primary_key_updates_need_opt_in() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("seq", 2).update_to("age", 1).eq("loginName", "abc");
        assert_eq!(
            usage(u.bound_sql().unwrap_err()),
            UsageError::UpdateKey("seq".to_string())
        );

        u.allow_update_key();
        assert_eq!(
            u.bound_sql().unwrap().sql(),
            "UPDATE tb_user SET seq = ? , age = ? WHERE login_name = ?"
        );
    }

    #[test]
    fn null_primary_key_is_left_out() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("seq", SqlValue::Null).update_to("age", 3).eq("loginName", "abc");
        let bound = u.bound_sql().unwrap();
        assert_eq!(bound.sql(), "UPDATE tb_user SET age = ? WHERE login_name = ?");
    }

    #[test]
    fn setting_a_property_twice_keeps_the_last_value() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("age", 1).update_to("age", 2).eq("seq", 1);
        let bound = u.bound_sql().unwrap();
        assert_eq!(bound.sql(), "UPDATE tb_user SET age = ? WHERE seq = ?");
        assert_eq!(bound.values(), vec![SqlValue::I64(2), SqlValue::I64(1)]);
    }

    #[test]
    fn two_properties_on_one_column() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("loginName", "a").update_to("login_name", "b").eq("seq", 1);
        assert_eq!(
            usage(u.bound_sql().unwrap_err()),
            UsageError::DuplicateColumn("login_name".to_string())
        );
    }

    #[test]
    fn update_from_maps_and_samples() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut row = BTreeMap::new();
        row.insert("age".to_string(), SqlValue::Null);
        row.insert("loginName".to_string(), SqlValue::from("abc"));

        let mut u = update();
        u.update_row(&row).eq("seq", 1);
        let bound = u.bound_sql().unwrap();
        assert_eq!(bound.sql(), "UPDATE tb_user SET age = ? , login_name = ? WHERE seq = ?");
        assert_eq!(
            bound.values(),
            vec![SqlValue::Null, SqlValue::from("abc"), SqlValue::I64(1)]
        );

        u.reset_update().update_to_sample(&row);
        assert_eq!(
            u.bound_sql().unwrap().sql(),
            "UPDATE tb_user SET login_name = ? WHERE seq = ?"
        );

        let mut u = update();
        u.update_to_map(&row).allow_empty_where();
        assert_eq!(u.bound_sql().unwrap().sql(), "UPDATE tb_user SET age = ? , login_name = ?");
    }

    #[test]
    fn set_templates_and_geometry() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = update();
        u.update_to("visits", 1)
            .update_to("location", "POINT(1 2)")
            .eq("seq", 1);
        assert_eq!(
            u.bound_sql().unwrap().sql(),
            "UPDATE tb_user SET visits = visits + ? , location = GeomFromText(?) WHERE seq = ?"
        );

        assert_eq!(u.set_flavor(Flavor::PostgreSQL), Flavor::MySQL);
        assert_eq!(
            u.bound_sql().unwrap().sql(),
            "UPDATE tb_user SET visits = visits + ? , location = ST_GeomFromText(?) WHERE seq = ?"
        );
    }

    #[test]
    fn update_in_strict_mode_rejects_unknown_properties() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut u = UpdateBuilder::for_map(
            TableMapping::new("tb_user").with_field(FieldMapping::new("seq", "seq")),
        );
        u.update_to("age", 1).eq("seq", 1);
        assert_eq!(
            usage(u.bound_sql().unwrap_err()),
            UsageError::NoSuchProperty("age".to_string())
        );
    }

    #[test]
    fn delete_with_where() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut d = DeleteBuilder::for_map(user_mapping());
        d.eq("seq", 1).or().in_("loginName", ["a", "b"]);
        let bound = d.bound_sql().unwrap();
        assert_eq!(
            bound.sql(),
            "DELETE FROM tb_user WHERE seq = ? OR login_name IN ( ? , ? )"
        );
        assert_eq!(bound.values().len(), 3);
    }

    #[test]
    fn delete_without_where_needs_opt_in() {
        let _g = set_default_flavor_scoped(Flavor::MySQL);
        let mut d = DeleteBuilder::for_map(user_mapping());
        assert_eq!(usage(d.bound_sql().unwrap_err()), UsageError::EmptyWhere("delete"));

        // 空分组不算条件
        d.nested(|_| {});
        assert_eq!(usage(d.bound_sql().unwrap_err()), UsageError::EmptyWhere("delete"));

        d.allow_empty_where();
        assert_eq!(d.bound_sql().unwrap().sql(), "DELETE FROM tb_user");
    }

    #[test]
    fn delete_uses_its_dialect() {
        let _g = set_default_flavor_scoped(Flavor::SQLServer);
        let mut d = DeleteBuilder::for_map(TableMapping::for_map("user").with_schema("dbo"));
        assert_eq!(d.flavor(), Flavor::SQLServer);
        d.eq("id", 1);
        assert_eq!(d.bound_sql().unwrap().sql(), "DELETE FROM dbo.[user] WHERE id = ?");
    }
}
