//! 生命周期钩子
//!
//! 实例可以选择实现初始化与销毁能力。引擎不会在运行时探测实例的类型，
//! 钩子在注册时通过描述符声明，并以类型擦除的形式保存。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::{Instance, ServiceKey};
use crate::errors::{BoxError, ContainerError};

/// 构造完成后、交给第一个调用者之前执行一次
pub trait Initialize: Send + Sync + 'static {
    fn initialize(&self) -> Result<(), BoxError>;
}

/// 异步初始化（例如等待外部连接）
#[async_trait]
pub trait AsyncInitialize: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), BoxError>;
}

/// 作用域或容器销毁时执行一次
pub trait Dispose: Send + Sync + 'static {
    fn dispose(&self) -> Result<(), BoxError>;
}

#[async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    async fn dispose(&self) -> Result<(), BoxError>;
}

type SyncHookFn = dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync;
type AsyncHookFn = dyn Fn(Instance) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// 类型擦除的钩子
#[derive(Clone)]
pub(crate) enum Hook {
    Sync(Arc<SyncHookFn>),
    Async(Arc<AsyncHookFn>),
}

impl Hook {
    pub(crate) fn initializer<T: Initialize>() -> Self {
        Hook::Sync(Arc::new(|instance: &Instance| downcast_ref::<T>(instance)?.initialize()))
    }

    pub(crate) fn async_initializer<T: AsyncInitialize>() -> Self {
        Hook::Async(Arc::new(|instance: Instance| {
            async move {
                let service = downcast::<T>(instance)?;
                service.initialize().await
            }
            .boxed()
        }))
    }

    pub(crate) fn disposer<T: Dispose>() -> Self {
        Hook::Sync(Arc::new(|instance: &Instance| downcast_ref::<T>(instance)?.dispose()))
    }

    pub(crate) fn async_disposer<T: AsyncDispose>() -> Self {
        Hook::Async(Arc::new(|instance: Instance| {
            async move {
                let service = downcast::<T>(instance)?;
                service.dispose().await
            }
            .boxed()
        }))
    }

    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Hook::Async(_))
    }

    pub(crate) async fn run(&self, instance: &Instance) -> Result<(), BoxError> {
        match self {
            Hook::Sync(hook) => hook(instance),
            Hook::Async(hook) => hook(instance.clone()).await,
        }
    }
}

fn downcast_ref<T: Send + Sync + 'static>(instance: &Instance) -> Result<&T, BoxError> {
    instance.downcast_ref::<T>().ok_or_else(|| {
        Box::new(ContainerError::TypeCastFailed {
            expected: std::any::type_name::<T>(),
            context: "lifecycle hook".to_string(),
        }) as BoxError
    })
}

fn downcast<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>, BoxError> {
    instance.downcast::<T>().map_err(|_| {
        Box::new(ContainerError::TypeCastFailed {
            expected: std::any::type_name::<T>(),
            context: "async lifecycle hook".to_string(),
        }) as BoxError
    })
}

/// 销毁过程中收集到的单个失败
#[derive(Debug)]
pub struct DisposalFailure {
    pub key: ServiceKey,
    pub error: BoxError,
}
