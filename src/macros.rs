//! `sql_entity!`：为普通 struct 生成字段描述符、`RowAccess` 与 `Entity`。
//!
//! ```ignore
//! halo_space::sql_entity! {
//!     impl UserInfo for "user_info" {
//!         SEQ: seq => "seq" [primary_key(true)],
//!         LOGIN_NAME: login_name => "login_name",
//!         LOCATION: location => "location" [sql_type(SqlType::Geometry)],
//!     }
//! }
//! ```
//!
//! 方括号中的每一项都会作为 `FieldMapping` 的 builder 方法调用。

/// 为 struct 生成映射元数据与取值/回写逻辑。
#[macro_export]
macro_rules! sql_entity {
    (
        impl $ty:ident for $table:literal {
            $(
                $konst:ident : $field:ident => $column:literal
                $( [ $( $opt:ident ( $($arg:expr),* ) ),* $(,)? ] )?
            ),* $(,)?
        }
    ) => {
        impl $ty {
            $(
                pub const $konst: $crate::mapping::Field =
                    $crate::mapping::Field::new(stringify!($field));
            )*
        }

        impl $crate::mapping::RowAccess for $ty {
            fn value_of(&self, property: &str) -> Option<$crate::value::SqlValue> {
                match property {
                    $(
                        stringify!($field) => Some($crate::value::SqlValue::from(self.$field.clone())),
                    )*
                    _ => None,
                }
            }

            fn properties(&self) -> Vec<String> {
                vec![$(stringify!($field).to_string()),*]
            }

            fn write_back(&mut self, property: &str, value: $crate::value::SqlValue) -> bool {
                match property {
                    $(
                        stringify!($field) => {
                            match $crate::mapping::FromSqlValue::from_sql_value(value) {
                                Some(v) => {
                                    self.$field = v;
                                    true
                                }
                                None => false,
                            }
                        }
                    )*
                    _ => false,
                }
            }
        }

        impl $crate::mapping::Entity for $ty {
            fn table_mapping() -> $crate::mapping::TableMapping {
                $crate::mapping::TableMapping::new($table)
                $(
                    .with_field(
                        $crate::mapping::FieldMapping::new(stringify!($field), $column)
                        $( $( .$opt($($arg),*) )* )?
                    )
                )*
            }
        }
    };
}
