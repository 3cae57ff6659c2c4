//! 依赖注入容器
//!
//! - `key`：服务键
//! - `descriptor`：服务注册描述
//! - `registry`：注册表
//! - `scope`：作用域与销毁顺序
//! - `lifecycle`：初始化与销毁钩子
//! - `engine`：解析引擎

pub mod descriptor;
pub mod engine;
pub mod key;
pub mod lifecycle;
pub mod registry;
pub mod scope;

use std::any::Any;
use std::sync::Arc;

pub use descriptor::{Args, Dependency, DependencyKind, DescriptorBuilder, Injectable, ProducerKind, ServiceDescriptor};
pub use engine::{ContainerStats, ServiceContainer};
pub use key::ServiceKey;
pub use lifecycle::{AsyncDispose, AsyncInitialize, DisposalFailure, Dispose, Initialize};
pub use registry::Registry;
pub use scope::{Scope, ScopeGuard, ScopeHandle, ScopeInfo, ScopeState};

/// 类型擦除的服务实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 服务生命周期
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// 单例 - 整个容器生命周期内只创建一次
    Singleton,
    /// 瞬态 - 每次请求都创建新实例
    Transient,
    /// 作用域 - 在最近的同名作用域内只创建一次
    Scoped(Arc<str>),
}

impl ServiceLifetime {
    pub fn scoped(name: impl Into<Arc<str>>) -> Self {
        ServiceLifetime::Scoped(name.into())
    }

    /// 作用域服务所属的作用域名
    pub fn scope_name(&self) -> Option<&str> {
        match self {
            ServiceLifetime::Scoped(name) => Some(name),
            _ => None,
        }
    }
}
