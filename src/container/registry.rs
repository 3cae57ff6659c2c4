//! 服务注册表
//!
//! 每个服务键最多只有一个有效描述符，重复注册会替换旧的描述符。
//! 注册时不做依赖图校验。

use std::sync::Arc;

use dashmap::DashMap;

use super::{ServiceDescriptor, ServiceKey};

#[derive(Default)]
pub struct Registry {
    descriptors: DashMap<ServiceKey, Arc<ServiceDescriptor>>,
    /// 子注册表查找失败时回退到父注册表
    parent: Option<Arc<Registry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child_of(parent: Arc<Registry>) -> Self {
        Self {
            descriptors: DashMap::new(),
            parent: Some(parent),
        }
    }

    /// 注册并返回被替换的描述符
    pub fn register(&self, descriptor: ServiceDescriptor) -> Option<Arc<ServiceDescriptor>> {
        let key = descriptor.key().clone();
        self.descriptors.insert(key, Arc::new(descriptor))
    }

    /// 只移除本级注册，不影响父注册表
    pub fn remove(&self, key: &ServiceKey) -> Option<Arc<ServiceDescriptor>> {
        self.descriptors.remove(key).map(|(_, descriptor)| descriptor)
    }

    pub fn lookup(&self, key: &ServiceKey) -> Option<Arc<ServiceDescriptor>> {
        if let Some(descriptor) = self.descriptors.get(key) {
            return Some(descriptor.value().clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(key))
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.descriptors.contains_key(key)
            || self.parent.as_ref().is_some_and(|parent| parent.contains(key))
    }

    /// 复制一份快照再遍历，结果按键排序；本级注册遮蔽父注册表中的同名键
    pub fn snapshot(&self) -> Vec<(ServiceKey, Arc<ServiceDescriptor>)> {
        let mut entries: Vec<_> = self
            .descriptors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if let Some(parent) = &self.parent {
            for (key, descriptor) in parent.snapshot() {
                if !self.descriptors.contains_key(&key) {
                    entries.push((key, descriptor));
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        self.snapshot().into_iter().map(|(key, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
