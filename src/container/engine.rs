//! 依赖注入容器（解析引擎）
//!
//! 解析流程：
//! - 循环依赖检测：同一次解析调用链上重复出现的键直接失败，并报告完整环路
//! - 生命周期缓存：单例缓存在根作用域，作用域服务缓存在最近的同名作用域
//! - 单飞构造：同一个键的并发首次解析只构造一次，其余调用者等待结果
//! - 取消安全：构造被取消时不会发布任何实例，其他调用者可以重试

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::descriptor::{Args, Producer};
use super::registry::Registry;
use super::scope::{ScopeGuard, ScopeHandle, TeardownEntry};
use super::{Instance, ServiceDescriptor, ServiceKey, ServiceLifetime};
use crate::config::ContainerConfig;
use crate::errors::{BoxError, ContainerError, ContainerResult, KeyChain};

/// 当前解析调用链上"正在进行"的键，仅用于循环检测
#[derive(Clone, Default)]
struct ResolutionFrame {
    keys: Vec<ServiceKey>,
}

impl ResolutionFrame {
    /// 压入一个键；键已经在链上时返回从首次出现到重复处的环路
    fn enter(&self, key: &ServiceKey) -> ContainerResult<ResolutionFrame> {
        if let Some(first) = self.keys.iter().position(|k| k == key) {
            let mut path = self.keys[first..].to_vec();
            path.push(key.clone());
            return Err(ContainerError::CircularDependency { path: path.into() });
        }
        let mut keys = self.keys.clone();
        keys.push(key.clone());
        Ok(ResolutionFrame { keys })
    }

    fn chain(&self) -> KeyChain {
        KeyChain(self.keys.clone())
    }
}

/// 预演遍历的模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkMode {
    /// 与 `resolve` 完全一致
    Resolve,
    /// 额外拒绝任何可能挂起的生产者
    Sync,
    /// 全图校验：假定作用域服务所需的作用域届时存在
    Validate,
}

/// 内部容器统计信息（原子计数器）
#[derive(Default)]
struct InnerStats {
    total_resolutions: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    singleton_creations: AtomicU64,
    scoped_creations: AtomicU64,
    transient_creations: AtomicU64,
    failed_resolutions: AtomicU64,
}

/// 容器统计信息
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    /// 顶层解析次数
    pub total_resolutions: u64,
    /// 单例和作用域缓存命中次数
    pub cache_hits: u64,
    /// 缓存未命中次数
    pub cache_misses: u64,
    pub singleton_creations: u64,
    pub scoped_creations: u64,
    pub transient_creations: u64,
    pub failed_resolutions: u64,
    /// 服务注册数量
    pub registered_services: usize,
    /// 活跃单例数量
    pub active_singletons: usize,
}

impl ContainerStats {
    /// 缓存命中率（小数形式）
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    pub fn total_creations(&self) -> u64 {
        self.singleton_creations + self.scoped_creations + self.transient_creations
    }

    pub fn performance_summary(&self) -> String {
        format!(
            "Container Performance: {} total resolutions, {:.1}% cache hit rate, {} registered services, {} active singletons",
            self.total_resolutions,
            self.hit_rate() * 100.0,
            self.registered_services,
            self.active_singletons
        )
    }
}

struct Inner {
    id: Uuid,
    registry: Arc<Registry>,
    root: ScopeHandle,
    config: ContainerConfig,
    stats: InnerStats,
    disposed: AtomicBool,
}

/// 依赖注入容器
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<Inner>,
}

impl ServiceContainer {
    /// 创建新的容器实例
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::build(Arc::new(Registry::new()), config)
    }

    fn build(registry: Arc<Registry>, config: ContainerConfig) -> Self {
        let id = Uuid::new_v4();
        let root = ScopeHandle::root(id, &config.root_scope_name);
        Self {
            inner: Arc::new(Inner {
                id,
                registry,
                root,
                config,
                stats: InnerStats::default(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// 子容器：拥有独立的单例缓存，注册表查找失败时回退到父容器
    pub fn create_child(&self) -> Self {
        Self::build(
            Arc::new(Registry::child_of(self.inner.registry.clone())),
            self.inner.config.clone(),
        )
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    // ===== 注册 =====

    /// 注册服务，返回被替换的旧描述符
    ///
    /// 已构造的旧单例不会因为重新注册而失效。
    pub fn register(&self, descriptor: ServiceDescriptor) -> ContainerResult<Option<Arc<ServiceDescriptor>>> {
        self.ensure_live()?;
        if let Some(scope) = descriptor.lifetime().scope_name() {
            self.ensure_scope_allowed(scope, "register")?;
        }
        debug!(key = %descriptor.key(), lifetime = ?descriptor.lifetime(), "registered service");
        Ok(self.inner.registry.register(descriptor))
    }

    pub fn unregister(&self, key: &ServiceKey) -> Option<Arc<ServiceDescriptor>> {
        let removed = self.inner.registry.remove(key);
        if removed.is_some() {
            debug!(key = %key, "unregistered service");
        }
        removed
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.inner.registry.contains(key)
    }

    pub fn is_registered<T: Send + Sync + 'static>(&self) -> bool {
        self.contains(&ServiceKey::of::<T>())
    }

    pub fn descriptor(&self, key: &ServiceKey) -> Option<Arc<ServiceDescriptor>> {
        self.inner.registry.lookup(key)
    }

    pub fn list_registered(&self) -> Vec<ServiceKey> {
        self.inner.registry.keys()
    }

    /// 每个注册键直接声明的依赖
    pub fn dependency_graph(&self) -> BTreeMap<ServiceKey, Vec<ServiceKey>> {
        self.inner
            .registry
            .snapshot()
            .into_iter()
            .map(|(key, descriptor)| {
                let deps: Vec<ServiceKey> = descriptor.dependencies().iter().map(|d| d.key().clone()).collect();
                (key, deps)
            })
            .collect()
    }

    // ===== 作用域 =====

    pub fn root_scope(&self) -> ScopeHandle {
        self.inner.root.clone()
    }

    /// 当前任务激活的作用域；没有或属于其他容器时为根作用域
    pub fn current_scope(&self) -> ScopeHandle {
        ScopeHandle::current()
            .filter(|scope| scope.owner() == self.inner.id)
            .unwrap_or_else(|| self.inner.root.clone())
    }

    /// 在当前作用域下创建子作用域
    ///
    /// 新作用域不会自动成为调用任务的当前作用域：用 `ScopeGuard::run` 激活，
    /// 或把 `guard.handle()` 传给 `resolve_in`。
    pub fn enter_scope(&self, name: &str) -> ContainerResult<ScopeGuard> {
        self.enter_scope_in(&self.current_scope(), name)
    }

    pub fn enter_scope_in(&self, parent: &ScopeHandle, name: &str) -> ContainerResult<ScopeGuard> {
        self.ensure_live()?;
        self.ensure_owned(parent)?;
        if name == self.inner.config.root_scope_name {
            return Err(ContainerError::scope_error(name, "enter_scope", "Scope name is reserved for the root scope"));
        }
        self.ensure_scope_allowed(name, "enter_scope")?;
        let scope = parent.child(name)?;
        debug!(scope = %name, id = %scope.id(), parent = %parent.name(), "entered scope");
        Ok(ScopeGuard::new(scope))
    }

    /// 结束作用域并按构造逆序销毁其实例
    pub async fn exit_scope(&self, scope: &ScopeHandle) -> ContainerResult<()> {
        self.ensure_owned(scope)?;
        if scope == &self.inner.root {
            return Err(ContainerError::scope_error(scope.name(), "exit_scope", "Use dispose() to end the root scope"));
        }
        debug!(scope = %scope.name(), id = %scope.id(), "exiting scope");
        scope.close(false).await
    }

    /// 作用域获取模式：在新作用域内运行 `f`，无论结果如何都会退出作用域
    pub async fn with_scope<F, Fut, R>(&self, name: &str, f: F) -> ContainerResult<R>
    where
        F: FnOnce(ScopeHandle) -> Fut,
        Fut: Future<Output = R>,
    {
        let guard = self.enter_scope(name)?;
        let scope = guard.handle().clone();
        let output = scope.activate(f(scope.clone())).await;
        guard.exit().await?;
        Ok(output)
    }

    // ===== 解析 =====

    /// 在当前作用域中解析服务
    pub async fn resolve<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        self.resolve_in(&self.current_scope()).await
    }

    pub async fn resolve_named<T: Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let key = ServiceKey::named::<T>(name);
        let instance = self.resolve_key(&key, &self.current_scope()).await?;
        downcast::<T>(&key, instance)
    }

    pub async fn resolve_in<T: Send + Sync + 'static>(&self, scope: &ScopeHandle) -> ContainerResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_key(&key, scope).await?;
        downcast::<T>(&key, instance)
    }

    /// 未注册时返回 `None`，其他错误照常返回
    pub async fn try_resolve<T: Send + Sync + 'static>(&self) -> ContainerResult<Option<Arc<T>>> {
        let key = ServiceKey::of::<T>();
        match self.try_resolve_key(&key, &self.current_scope()).await? {
            Some(instance) => downcast::<T>(&key, instance).map(Some),
            None => Ok(None),
        }
    }

    pub async fn try_resolve_key(&self, key: &ServiceKey, scope: &ScopeHandle) -> ContainerResult<Option<Instance>> {
        if !self.contains(key) {
            return Ok(None);
        }
        self.resolve_key(key, scope).await.map(Some)
    }

    /// 解析契约为 `T` 的所有注册（任意名称），按键排序
    pub async fn resolve_all<T: Send + Sync + 'static>(&self) -> ContainerResult<Vec<Arc<T>>> {
        let scope = self.current_scope();
        let mut services = Vec::new();
        for key in self.list_registered().into_iter().filter(|key| key.is_contract::<T>()) {
            let instance = self.resolve_key(&key, &scope).await?;
            services.push(downcast::<T>(&key, instance)?);
        }
        Ok(services)
    }

    /// 类型擦除的解析入口
    pub async fn resolve_key(&self, key: &ServiceKey, scope: &ScopeHandle) -> ContainerResult<Instance> {
        self.inner.stats.total_resolutions.fetch_add(1, Ordering::Relaxed);
        let result = match self
            .ensure_live()
            .and_then(|_| self.ensure_owned(scope))
            .and_then(|_| self.detect_cycle(key, scope))
        {
            Ok(()) => self.resolve_inner(key, scope, &ResolutionFrame::default()).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.inner.stats.failed_resolutions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, error = %err, "resolution failed");
        }
        result
    }

    /// 同步解析：任何传递依赖需要挂起时直接失败
    pub fn resolve_sync<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_key_sync(&key, &self.current_scope())?;
        downcast::<T>(&key, instance)
    }

    pub fn resolve_key_sync(&self, key: &ServiceKey, scope: &ScopeHandle) -> ContainerResult<Instance> {
        self.ensure_live()?;
        self.ensure_owned(scope)?;
        self.walk(key, scope, &ResolutionFrame::default(), WalkMode::Sync)?;
        // 预检已排除异步生产者；仍然挂起只可能是其他任务正在构造同一个键
        self.resolve_key(key, scope).now_or_never().unwrap_or_else(|| {
            Err(ContainerError::SuspensionRequired {
                key: key.clone(),
                chain: KeyChain(vec![key.clone()]),
            })
        })
    }

    // ===== 内省 =====

    /// 不构造任何实例的预演，返回解析时会遇到的依赖图错误
    pub fn check(&self, key: &ServiceKey, scope: &ScopeHandle) -> ContainerResult<()> {
        self.ensure_live()?;
        self.ensure_owned(scope)?;
        self.walk(key, scope, &ResolutionFrame::default(), WalkMode::Resolve)
    }

    pub fn can_resolve(&self, key: &ServiceKey) -> bool {
        self.check(key, &self.current_scope()).is_ok()
    }

    /// 校验全部注册，收集所有失败
    pub fn validate(&self) -> Result<(), Vec<ContainerError>> {
        let root = self.root_scope();
        let errors: Vec<_> = self
            .list_registered()
            .iter()
            .filter_map(|key| self.walk(key, &root, &ResolutionFrame::default(), WalkMode::Validate).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    // ===== 容器生命周期 =====

    /// 销毁所有单例并拒绝之后的注册和解析
    pub async fn dispose(&self) -> ContainerResult<()> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(container = %self.inner.id, "disposing container");
        self.inner.root.close(true).await
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// 获取容器统计信息
    pub fn get_stats(&self) -> ContainerStats {
        let stats = &self.inner.stats;
        ContainerStats {
            total_resolutions: stats.total_resolutions.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: stats.cache_misses.load(Ordering::Relaxed),
            singleton_creations: stats.singleton_creations.load(Ordering::Relaxed),
            scoped_creations: stats.scoped_creations.load(Ordering::Relaxed),
            transient_creations: stats.transient_creations.load(Ordering::Relaxed),
            failed_resolutions: stats.failed_resolutions.load(Ordering::Relaxed),
            registered_services: self.inner.registry.len(),
            active_singletons: self.inner.root.cached_instances(),
        }
    }

    pub fn reset_stats(&self) {
        let stats = &self.inner.stats;
        for counter in [
            &stats.total_resolutions,
            &stats.cache_hits,
            &stats.cache_misses,
            &stats.singleton_creations,
            &stats.scoped_creations,
            &stats.transient_creations,
            &stats.failed_resolutions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    // ===== 内部实现 =====

    fn resolve_inner<'a>(
        &'a self,
        key: &'a ServiceKey,
        scope: &'a ScopeHandle,
        frame: &'a ResolutionFrame,
    ) -> BoxFuture<'a, ContainerResult<Instance>> {
        async move {
            let frame = frame.enter(key)?;
            let descriptor = self.lookup(key, &frame)?;
            match descriptor.lifetime() {
                ServiceLifetime::Transient => self.construct(&descriptor, scope, &frame).await,
                ServiceLifetime::Singleton => {
                    self.resolve_cached(&descriptor, &self.inner.root, scope, &frame).await
                }
                ServiceLifetime::Scoped(name) => {
                    let owner = self.owning_scope(key, name, scope, &frame)?;
                    self.resolve_cached(&descriptor, &owner, scope, &frame).await
                }
            }
        }
        .boxed()
    }

    async fn resolve_cached(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        owner: &ScopeHandle,
        calling: &ScopeHandle,
        frame: &ResolutionFrame,
    ) -> ContainerResult<Instance> {
        let key = descriptor.key();
        ensure_active(owner, key)?;

        if let Some(instance) = owner.cached(key) {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            if self.inner.config.trace_resolutions {
                trace!(key = %key, scope = %owner.name(), chain = %frame.chain(), "cache hit");
            }
            return Ok(instance);
        }
        self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let dependency_scope = if self.inner.config.strict_lifetimes { owner } else { calling };
        let slot = owner.slot(key);
        let instance = slot
            .get_or_try_init(|| async move {
                let instance = self.construct(descriptor, dependency_scope, frame).await?;
                let recorded = owner.record(TeardownEntry {
                    key: key.clone(),
                    instance: instance.clone(),
                    disposer: descriptor.disposer().cloned(),
                });
                if let Err(err) = recorded {
                    // 作用域在构造期间结束：实例不会被缓存，立即销毁
                    if let Some(disposer) = descriptor.disposer() {
                        if let Err(error) = disposer.run(&instance).await {
                            warn!(key = %key, %error, "dispose of orphaned instance failed");
                        }
                    }
                    return Err(err);
                }
                Ok::<_, ContainerError>(instance)
            })
            .await?;
        Ok(instance.clone())
    }

    async fn construct(
        &self,
        descriptor: &ServiceDescriptor,
        scope: &ScopeHandle,
        frame: &ResolutionFrame,
    ) -> ContainerResult<Instance> {
        let key = descriptor.key();
        let args = self.resolve_arguments(descriptor, scope, frame).await?;

        let instance = match descriptor.producer() {
            Producer::Instance(instance) => instance.clone(),
            Producer::Factory(factory) | Producer::Constructible(factory) => {
                factory(&args).map_err(|source| construction_failed(key, frame, source))?
            }
            Producer::AsyncFactory(factory) => factory(args)
                .await
                .map_err(|source| construction_failed(key, frame, source))?,
        };

        if let Some(initializer) = descriptor.initializer() {
            initializer
                .run(&instance)
                .await
                .map_err(|source| construction_failed(key, frame, source))?;
        }

        let counter = match descriptor.lifetime() {
            ServiceLifetime::Singleton => &self.inner.stats.singleton_creations,
            ServiceLifetime::Scoped(_) => &self.inner.stats.scoped_creations,
            ServiceLifetime::Transient => &self.inner.stats.transient_creations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, lifetime = ?descriptor.lifetime(), "constructed service");
        Ok(instance)
    }

    /// 按声明顺序解析参数
    async fn resolve_arguments(
        &self,
        descriptor: &ServiceDescriptor,
        scope: &ScopeHandle,
        frame: &ResolutionFrame,
    ) -> ContainerResult<Args> {
        let owner = descriptor.key();
        let mut values: Vec<(Arc<str>, Option<Instance>)> = Vec::with_capacity(descriptor.dependencies().len());
        for dependency in descriptor.dependencies() {
            let value = if self.contains(dependency.key()) {
                Some(self.resolve_inner(dependency.key(), scope, frame).await?)
            } else if dependency.is_optional() {
                dependency.default_value()
            } else {
                return Err(missing_parameter(owner, dependency.param(), dependency.key(), frame));
            };
            values.push((dependency.param().into(), value));
        }
        Ok(Args::new(owner.clone(), values))
    }

    /// 构造之前按声明的依赖图检查环路
    ///
    /// 并发任务从环上不同的键进入时彼此看不到对方的调用链，必须在占用槽位之前拒绝。
    /// 只上报环路错误。
    fn detect_cycle(&self, key: &ServiceKey, scope: &ScopeHandle) -> ContainerResult<()> {
        match self.walk(key, scope, &ResolutionFrame::default(), WalkMode::Resolve) {
            Err(err @ ContainerError::CircularDependency { .. }) => Err(err),
            _ => Ok(()),
        }
    }

    /// 与解析相同的遍历，但不构造任何实例
    fn walk(&self, key: &ServiceKey, scope: &ScopeHandle, frame: &ResolutionFrame, mode: WalkMode) -> ContainerResult<()> {
        let frame = frame.enter(key)?;
        let descriptor = self.lookup(key, &frame)?;

        let owner = match descriptor.lifetime() {
            ServiceLifetime::Transient => None,
            ServiceLifetime::Singleton => Some(self.inner.root.clone()),
            ServiceLifetime::Scoped(name) => match self.owning_scope(key, name, scope, &frame) {
                Ok(owner) => Some(owner),
                Err(_) if mode == WalkMode::Validate => None,
                Err(err) => return Err(err),
            },
        };

        if let Some(owner) = &owner {
            ensure_active(owner, key)?;
            if owner.cached(key).is_some() {
                return Ok(());
            }
            if mode == WalkMode::Sync && owner.is_constructing(key) {
                return Err(suspension_required(key, &frame));
            }
        }
        if mode == WalkMode::Sync && descriptor.requires_suspension() {
            return Err(suspension_required(key, &frame));
        }

        let dependency_scope = match (&owner, self.inner.config.strict_lifetimes) {
            (Some(owner), true) => owner,
            _ => scope,
        };
        for dependency in descriptor.dependencies() {
            if self.contains(dependency.key()) {
                self.walk(dependency.key(), dependency_scope, &frame, mode)?;
            } else if !dependency.is_optional() {
                return Err(missing_parameter(key, dependency.param(), dependency.key(), &frame));
            }
        }
        Ok(())
    }

    fn lookup(&self, key: &ServiceKey, frame: &ResolutionFrame) -> ContainerResult<Arc<ServiceDescriptor>> {
        self.inner.registry.lookup(key).ok_or_else(|| ContainerError::NotRegistered {
            key: key.clone(),
            chain: frame.chain(),
            available: self.list_registered().iter().map(ToString::to_string).collect(),
        })
    }

    fn owning_scope(
        &self,
        key: &ServiceKey,
        name: &str,
        scope: &ScopeHandle,
        frame: &ResolutionFrame,
    ) -> ContainerResult<ScopeHandle> {
        scope.find_nearest(name).ok_or_else(|| ContainerError::NoActiveScope {
            key: key.clone(),
            scope: name.to_string(),
            chain: frame.chain(),
        })
    }

    fn ensure_live(&self) -> ContainerResult<()> {
        if self.is_disposed() {
            Err(ContainerError::ContainerDisposed)
        } else {
            Ok(())
        }
    }

    fn ensure_owned(&self, scope: &ScopeHandle) -> ContainerResult<()> {
        if scope.owner() == self.inner.id {
            Ok(())
        } else {
            Err(ContainerError::scope_error(
                scope.name(),
                "resolve",
                "Scope belongs to a different container",
            ))
        }
    }

    fn ensure_scope_allowed(&self, name: &str, operation: &str) -> ContainerResult<()> {
        if name == self.inner.config.root_scope_name {
            return Ok(());
        }
        match &self.inner.config.allowed_scopes {
            Some(allowed) if !allowed.iter().any(|scope| scope == name) => {
                Err(ContainerError::scope_error(name, operation, format!("Unknown scope: {name}")))
            }
            _ => Ok(()),
        }
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_active(scope: &ScopeHandle, key: &ServiceKey) -> ContainerResult<()> {
    if scope.is_active() {
        Ok(())
    } else {
        Err(ContainerError::scope_error(
            scope.name(),
            "resolve",
            format!("Cannot resolve '{key}' in scope with state {:?}", scope.state()),
        ))
    }
}

fn downcast<T: Send + Sync + 'static>(key: &ServiceKey, instance: Arc<dyn Any + Send + Sync>) -> ContainerResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| ContainerError::TypeCastFailed {
        expected: std::any::type_name::<T>(),
        context: format!("resolution of '{key}'"),
    })
}

fn construction_failed(key: &ServiceKey, frame: &ResolutionFrame, source: BoxError) -> ContainerError {
    ContainerError::ConstructionFailed {
        key: key.clone(),
        chain: frame.chain(),
        source,
    }
}

fn missing_parameter(owner: &ServiceKey, param: &str, dependency: &ServiceKey, frame: &ResolutionFrame) -> ContainerError {
    ContainerError::MissingParameter {
        requester: owner.clone(),
        parameter: param.to_string(),
        dependency: dependency.clone(),
        chain: frame.chain(),
    }
}

fn suspension_required(key: &ServiceKey, frame: &ResolutionFrame) -> ContainerError {
    ContainerError::SuspensionRequired {
        key: key.clone(),
        chain: frame.chain(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Dependency;

    struct A;
    struct B;
    struct C;

    #[test]
    fn frame_reports_cycle_from_first_occurrence() {
        let frame = ResolutionFrame::default()
            .enter(&ServiceKey::of::<C>())
            .and_then(|f| f.enter(&ServiceKey::of::<A>()))
            .and_then(|f| f.enter(&ServiceKey::of::<B>()))
            .unwrap();

        match frame.enter(&ServiceKey::of::<A>()) {
            Err(ContainerError::CircularDependency { path }) => {
                let names: Vec<_> = path.keys().iter().map(ToString::to_string).collect();
                assert_eq!(names, vec!["A", "B", "A"]);
            }
            _ => panic!("expected a cycle"),
        }
    }

    #[tokio::test]
    async fn stats_track_hits_and_creations() {
        let container = ServiceContainer::new();
        container
            .register(ServiceDescriptor::singleton::<A>().factory(|_| Ok(A)))
            .unwrap();
        container
            .register(ServiceDescriptor::transient::<B>().depends_on::<A>("a").factory(|_| Ok(B)))
            .unwrap();

        container.resolve::<B>().await.unwrap();
        container.resolve::<B>().await.unwrap();

        let stats = container.get_stats();
        assert_eq!(stats.total_resolutions, 2);
        assert_eq!(stats.transient_creations, 2);
        assert_eq!(stats.singleton_creations, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.registered_services, 2);
        assert_eq!(stats.active_singletons, 1);
        assert!(stats.performance_summary().contains("2 total resolutions"));

        container.reset_stats();
        assert_eq!(container.get_stats().total_resolutions, 0);
    }

    #[tokio::test]
    async fn scopes_from_other_containers_are_rejected() {
        let first = ServiceContainer::new();
        let second = ServiceContainer::new();
        first.register(ServiceDescriptor::instance(A)).unwrap();

        let err = first.resolve_key(&ServiceKey::of::<A>(), &second.root_scope()).await.unwrap_err();
        assert!(matches!(err, ContainerError::ScopeError { .. }));
        assert!(first.enter_scope_in(&second.root_scope(), "request").is_err());
    }

    #[tokio::test]
    async fn allowed_scopes_are_enforced() {
        let container = ServiceContainer::with_config(ContainerConfig {
            allowed_scopes: Some(vec!["request".into()]),
            ..ContainerConfig::default()
        });

        assert!(container
            .register(ServiceDescriptor::scoped::<A>("session").factory(|_| Ok(A)))
            .is_err());
        assert!(container
            .register(ServiceDescriptor::scoped::<A>("request").factory(|_| Ok(A)))
            .is_ok());
        assert!(container.enter_scope("session").is_err());
        assert!(container.enter_scope("singleton").is_err());
        container.enter_scope("request").unwrap().exit().await.unwrap();
    }

    #[test]
    fn validate_collects_every_broken_registration() {
        let container = ServiceContainer::new();
        container
            .register(ServiceDescriptor::transient::<A>().depends_on::<C>("c").factory(|_| Ok(A)))
            .unwrap();
        container
            .register(
                ServiceDescriptor::transient::<B>()
                    .dependency(Dependency::optional::<C>("c"))
                    .factory(|_| Ok(B)),
            )
            .unwrap();
        container
            .register(ServiceDescriptor::scoped::<C>("request").depends_on::<B>("b").factory(|_| Ok(C)))
            .unwrap();
        container.unregister(&ServiceKey::of::<C>());

        let errors = container.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ContainerError::MissingParameter { .. }));
    }
}
