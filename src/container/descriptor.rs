//! 服务描述符
//!
//! 一个描述符就是一次完整的注册：键、生命周期、生产方式、依赖声明和元数据。
//! 依赖以数据形式声明（参数名 + 服务键），而不是在运行时从函数签名推断，
//! 因此整个依赖图可以在不构造任何实例的情况下被检查。

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use super::lifecycle::{AsyncDispose, AsyncInitialize, Dispose, Hook, Initialize};
use super::{Instance, ServiceKey, ServiceLifetime};
use crate::errors::{ArgumentError, BoxError};

/// 依赖是否必需
#[derive(Clone)]
pub enum DependencyKind {
    Required,
    /// 未注册时使用 `default`，没有默认值则得到缺省标记
    Optional { default: Option<Instance> },
}

/// 生产者声明的一个参数
#[derive(Clone)]
pub struct Dependency {
    param: Arc<str>,
    key: ServiceKey,
    kind: DependencyKind,
}

impl Dependency {
    pub fn required<T: Send + Sync + 'static>(param: &str) -> Self {
        Self::required_key(param, ServiceKey::of::<T>())
    }

    pub fn required_key(param: &str, key: ServiceKey) -> Self {
        Self {
            param: param.into(),
            key,
            kind: DependencyKind::Required,
        }
    }

    pub fn optional<T: Send + Sync + 'static>(param: &str) -> Self {
        Self::optional_key(param, ServiceKey::of::<T>())
    }

    pub fn optional_key(param: &str, key: ServiceKey) -> Self {
        Self {
            param: param.into(),
            key,
            kind: DependencyKind::Optional { default: None },
        }
    }

    pub fn optional_or<T: Send + Sync + 'static>(param: &str, default: T) -> Self {
        Self {
            param: param.into(),
            key: ServiceKey::of::<T>(),
            kind: DependencyKind::Optional {
                default: Some(Arc::new(default)),
            },
        }
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.kind, DependencyKind::Optional { .. })
    }

    pub(crate) fn default_value(&self) -> Option<Instance> {
        match &self.kind {
            DependencyKind::Optional { default } => default.clone(),
            DependencyKind::Required => None,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("param", &self.param)
            .field("key", &self.key)
            .field("optional", &self.is_optional())
            .finish()
    }
}

/// 已解析的参数，按声明顺序排列
#[derive(Clone)]
pub struct Args {
    owner: ServiceKey,
    values: Vec<(Arc<str>, Option<Instance>)>,
}

impl Args {
    pub(crate) fn new(owner: ServiceKey, values: Vec<(Arc<str>, Option<Instance>)>) -> Self {
        Self { owner, values }
    }

    /// 正在构造的服务
    pub fn owner(&self) -> &ServiceKey {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(param, _)| param.as_ref())
    }

    /// 未做类型转换的参数值
    pub fn raw(&self, param: &str) -> Result<Option<&Instance>, ArgumentError> {
        self.values
            .iter()
            .find(|(name, _)| name.as_ref() == param)
            .map(|(_, value)| value.as_ref())
            .ok_or_else(|| ArgumentError::Undeclared {
                owner: self.owner.to_string(),
                param: param.to_string(),
            })
    }

    /// 必需参数
    pub fn get<T: Send + Sync + 'static>(&self, param: &str) -> Result<Arc<T>, ArgumentError> {
        self.optional::<T>(param)?.ok_or_else(|| ArgumentError::Absent {
            owner: self.owner.to_string(),
            param: param.to_string(),
        })
    }

    /// 可选参数，未注册且没有默认值时为 `None`
    pub fn optional<T: Send + Sync + 'static>(&self, param: &str) -> Result<Option<Arc<T>>, ArgumentError> {
        match self.raw(param)? {
            None => Ok(None),
            Some(value) => value
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ArgumentError::WrongType {
                    owner: self.owner.to_string(),
                    param: param.to_string(),
                    expected: std::any::type_name::<T>(),
                }),
        }
    }
}

/// 可由容器直接构造的类型
///
/// 相当于"构造函数参数即依赖"：`dependencies` 声明参数，`construct` 使用它们。
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Dependency>;

    fn construct(args: &Args) -> Result<Self, BoxError>;
}

type SyncFactoryFn = dyn Fn(&Args) -> Result<Instance, BoxError> + Send + Sync;
type AsyncFactoryFn = dyn Fn(Args) -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync;

#[derive(Clone)]
pub(crate) enum Producer {
    Instance(Instance),
    Factory(Arc<SyncFactoryFn>),
    AsyncFactory(Arc<AsyncFactoryFn>),
    Constructible(Arc<SyncFactoryFn>),
}

/// 生产方式，供外部工具查看
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    Instance,
    Factory,
    AsyncFactory,
    Constructible,
}

/// 一次服务注册
#[derive(Clone)]
pub struct ServiceDescriptor {
    key: ServiceKey,
    lifetime: ServiceLifetime,
    producer: Producer,
    dependencies: Vec<Dependency>,
    metadata: BTreeMap<String, serde_json::Value>,
    initializer: Option<Hook>,
    disposer: Option<Hook>,
}

impl ServiceDescriptor {
    pub fn builder<T: Send + Sync + 'static>(lifetime: ServiceLifetime) -> DescriptorBuilder<T> {
        DescriptorBuilder {
            key: ServiceKey::of::<T>(),
            lifetime,
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
            initializer: None,
            disposer: None,
            _marker: PhantomData,
        }
    }

    pub fn singleton<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        Self::builder(ServiceLifetime::Singleton)
    }

    pub fn transient<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        Self::builder(ServiceLifetime::Transient)
    }

    pub fn scoped<T: Send + Sync + 'static>(scope: impl Into<Arc<str>>) -> DescriptorBuilder<T> {
        Self::builder(ServiceLifetime::Scoped(scope.into()))
    }

    /// 预先构造好的实例，总是单例
    pub fn instance<T: Send + Sync + 'static>(value: T) -> ServiceDescriptor {
        Self::singleton::<T>().instance(value)
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn lifetime(&self) -> &ServiceLifetime {
        &self.lifetime
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn producer_kind(&self) -> ProducerKind {
        match self.producer {
            Producer::Instance(_) => ProducerKind::Instance,
            Producer::Factory(_) => ProducerKind::Factory,
            Producer::AsyncFactory(_) => ProducerKind::AsyncFactory,
            Producer::Constructible(_) => ProducerKind::Constructible,
        }
    }

    /// 生产者或初始化钩子是否可能挂起
    pub fn requires_suspension(&self) -> bool {
        matches!(self.producer, Producer::AsyncFactory(_))
            || self.initializer.as_ref().is_some_and(Hook::is_async)
    }

    pub fn has_initializer(&self) -> bool {
        self.initializer.is_some()
    }

    pub fn has_disposer(&self) -> bool {
        self.disposer.is_some()
    }

    pub(crate) fn producer(&self) -> &Producer {
        &self.producer
    }

    pub(crate) fn initializer(&self) -> Option<&Hook> {
        self.initializer.as_ref()
    }

    pub(crate) fn disposer(&self) -> Option<&Hook> {
        self.disposer.as_ref()
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("producer", &self.producer_kind())
            .field("dependencies", &self.dependencies)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// 类型化的描述符构建器，以生产方式结束
pub struct DescriptorBuilder<T> {
    key: ServiceKey,
    lifetime: ServiceLifetime,
    dependencies: Vec<Dependency>,
    metadata: BTreeMap<String, serde_json::Value>,
    initializer: Option<Hook>,
    disposer: Option<Hook>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.key = self.key.with_name(name);
        self
    }

    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn depends_on<U: Send + Sync + 'static>(self, param: &str) -> Self {
        self.dependency(Dependency::required::<U>(param))
    }

    pub fn depends_on_named<U: Send + Sync + 'static>(self, param: &str, name: &str) -> Self {
        self.dependency(Dependency::required_key(param, ServiceKey::named::<U>(name)))
    }

    pub fn optional<U: Send + Sync + 'static>(self, param: &str) -> Self {
        self.dependency(Dependency::optional::<U>(param))
    }

    pub fn optional_or<U: Send + Sync + 'static>(self, param: &str, default: U) -> Self {
        self.dependency(Dependency::optional_or(param, default))
    }

    /// 元数据只供外部编排层使用
    pub fn tag(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_initializer(mut self) -> Self
    where
        T: Initialize,
    {
        self.initializer = Some(Hook::initializer::<T>());
        self
    }

    pub fn with_async_initializer(mut self) -> Self
    where
        T: AsyncInitialize,
    {
        self.initializer = Some(Hook::async_initializer::<T>());
        self
    }

    pub fn with_disposer(mut self) -> Self
    where
        T: Dispose,
    {
        self.disposer = Some(Hook::disposer::<T>());
        self
    }

    pub fn with_async_disposer(mut self) -> Self
    where
        T: AsyncDispose,
    {
        self.disposer = Some(Hook::async_disposer::<T>());
        self
    }

    pub fn factory<F>(self, factory: F) -> ServiceDescriptor
    where
        F: Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let erased: Arc<SyncFactoryFn> =
            Arc::new(move |args: &Args| factory(args).map(|service| Arc::new(service) as Instance));
        self.finish(Producer::Factory(erased))
    }

    pub fn async_factory<F, Fut>(self, factory: F) -> ServiceDescriptor
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let erased: Arc<AsyncFactoryFn> = Arc::new(move |args: Args| {
            let pending = factory(args);
            async move { pending.await.map(|service| Arc::new(service) as Instance) }.boxed()
        });
        self.finish(Producer::AsyncFactory(erased))
    }

    /// 注册已存在的实例；生命周期固定为单例
    pub fn instance(self, value: T) -> ServiceDescriptor {
        self.instance_arc(Arc::new(value))
    }

    pub fn instance_arc(mut self, value: Arc<T>) -> ServiceDescriptor {
        self.lifetime = ServiceLifetime::Singleton;
        self.finish(Producer::Instance(value))
    }

    fn finish(self, producer: Producer) -> ServiceDescriptor {
        ServiceDescriptor {
            key: self.key,
            lifetime: self.lifetime,
            producer,
            dependencies: self.dependencies,
            metadata: self.metadata,
            initializer: self.initializer,
            disposer: self.disposer,
        }
    }
}

impl<T: Injectable> DescriptorBuilder<T> {
    /// 由 `Injectable` 声明的依赖构造，构建器上额外声明的依赖排在其后
    pub fn constructible(mut self) -> ServiceDescriptor {
        let mut dependencies = T::dependencies();
        dependencies.append(&mut self.dependencies);
        self.dependencies = dependencies;
        let erased: Arc<SyncFactoryFn> =
            Arc::new(|args: &Args| T::construct(args).map(|service| Arc::new(service) as Instance));
        self.finish(Producer::Constructible(erased))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database {
        url: String,
    }

    struct Repository {
        db: Arc<Database>,
    }

    impl Injectable for Repository {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::required::<Database>("db")]
        }

        fn construct(args: &Args) -> Result<Self, BoxError> {
            Ok(Repository { db: args.get("db")? })
        }
    }

    #[test]
    fn builder_records_dependencies_in_declared_order() {
        let descriptor = ServiceDescriptor::transient::<Repository>()
            .optional::<String>("label")
            .constructible();

        let params: Vec<_> = descriptor.dependencies().iter().map(Dependency::param).collect();
        assert_eq!(params, vec!["db", "label"]);
        assert_eq!(descriptor.producer_kind(), ProducerKind::Constructible);
        assert_eq!(descriptor.lifetime(), &ServiceLifetime::Transient);
        assert!(!descriptor.requires_suspension());
    }

    #[test]
    fn instance_registration_is_always_singleton() {
        let descriptor = ServiceDescriptor::transient::<Database>()
            .named("primary")
            .tag("priority", 10)
            .instance(Database { url: "mem://".into() });

        assert_eq!(descriptor.lifetime(), &ServiceLifetime::Singleton);
        assert_eq!(descriptor.key(), &ServiceKey::named::<Database>("primary"));
        assert_eq!(descriptor.metadata()["priority"], serde_json::json!(10));
    }

    #[test]
    fn async_factory_requires_suspension() {
        let descriptor = ServiceDescriptor::singleton::<Database>()
            .async_factory(|_| async { Ok::<_, BoxError>(Database { url: "pg://".into() }) });
        assert!(descriptor.requires_suspension());
        assert_eq!(descriptor.producer_kind(), ProducerKind::AsyncFactory);
    }

    #[test]
    fn args_accessors_check_declaration_and_type() {
        let db: Instance = Arc::new(Database { url: "mem://".into() });
        let args = Args::new(
            ServiceKey::of::<Repository>(),
            vec![("db".into(), Some(db)), ("label".into(), None)],
        );

        let repo = Repository::construct(&args).unwrap();
        assert_eq!(repo.db.url, "mem://");
        assert!(args.optional::<String>("label").unwrap().is_none());
        assert!(matches!(args.get::<String>("label"), Err(ArgumentError::Absent { .. })));
        assert!(matches!(args.get::<String>("db"), Err(ArgumentError::WrongType { .. })));
        assert!(matches!(args.get::<Database>("cache"), Err(ArgumentError::Undeclared { .. })));
        assert_eq!(args.params().collect::<Vec<_>>(), vec!["db", "label"]);
    }
}
