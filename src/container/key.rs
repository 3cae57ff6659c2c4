//! 服务键
//!
//! 服务键由契约类型和可选的名称组成，两者都相同时才视为同一个键。

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 服务标识：(契约类型, 可选名称)
#[derive(Clone)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<Arc<str>>,
}

impl ServiceKey {
    /// 未命名的类型键
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    /// 带名称的类型键
    pub fn named<T: ?Sized + 'static>(name: impl Into<Arc<str>>) -> Self {
        Self::of::<T>().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 去掉名称，只保留契约
    pub fn unnamed(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            name: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 完整的类型路径
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 去掉模块路径后的类型名，用于日志和错误信息
    pub fn contract_name(&self) -> String {
        short_type_name(self.type_name)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_contract<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for ServiceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// 按类型名排序使枚举结果在多次运行间保持稳定
impl Ord for ServiceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_name
            .cmp(other.type_name)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.type_id.cmp(&other.type_id))
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contract_name())?;
        if let Some(name) = &self.name {
            write!(f, ":{name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({self})")
    }
}

fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            c if c.is_alphanumeric() || c == '_' => segment.push(c),
            other => {
                out.push_str(&segment);
                segment.clear();
                out.push(other);
            }
        }
    }
    out.push_str(&segment);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Database;
    struct Cache;

    #[test]
    fn keys_compare_on_contract_and_name() {
        assert_eq!(ServiceKey::of::<Database>(), ServiceKey::of::<Database>());
        assert_ne!(ServiceKey::of::<Database>(), ServiceKey::of::<Cache>());
        assert_ne!(ServiceKey::of::<Database>(), ServiceKey::named::<Database>("replica"));
        assert_eq!(
            ServiceKey::named::<Database>("replica"),
            ServiceKey::of::<Database>().with_name("replica")
        );

        let set: HashSet<_> = [
            ServiceKey::of::<Database>(),
            ServiceKey::of::<Database>(),
            ServiceKey::named::<Database>("replica"),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn display_strips_module_paths() {
        assert_eq!(ServiceKey::of::<Database>().to_string(), "Database");
        assert_eq!(ServiceKey::named::<Cache>("hot").to_string(), "Cache:hot");
        assert_eq!(ServiceKey::of::<Arc<Vec<Database>>>().to_string(), "Arc<Vec<Database>>");
    }

    #[test]
    fn unnamed_drops_discriminator() {
        let key = ServiceKey::named::<Database>("replica");
        assert_eq!(key.unnamed(), ServiceKey::of::<Database>());
        assert!(key.is_contract::<Database>());
    }
}
