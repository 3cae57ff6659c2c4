//! 异步依赖注入运行时
//!
//! 按服务键注册生产者，按生命周期（单例、瞬态、作用域）缓存实例，
//! 在构造前检测循环依赖，并在作用域结束时按构造的逆序执行销毁钩子。

pub mod config;
pub mod container;
pub mod errors;
pub mod logging;

// Re-export commonly used items for convenience
pub use config::ContainerConfig;
pub use container::{
    Args, AsyncDispose, AsyncInitialize, ContainerStats, Dependency, Dispose, Initialize, Injectable,
    ScopeGuard, ScopeHandle, ServiceContainer, ServiceDescriptor, ServiceKey, ServiceLifetime,
};
pub use errors::{BoxError, ContainerError, ContainerResult};
