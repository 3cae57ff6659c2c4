//! 作用域管理
//!
//! 根作用域（默认名为 "singleton"）随容器存在；嵌套作用域在进入时创建，
//! 退出时按构造的逆序销毁其中的实例。每个任务通过 task-local 记录当前
//! 激活的作用域，因此并发任务之间互不干扰。

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use super::lifecycle::{DisposalFailure, Hook};
use super::{Instance, ServiceKey};
use crate::errors::{ContainerError, ContainerResult};

tokio::task_local! {
    static ACTIVE_SCOPE: ScopeHandle;
}

/// 作用域状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// 可以解析和缓存实例
    Active,
    /// 正在销毁
    Ending,
    /// 已结束，不能继续使用
    Ended,
}

pub(crate) struct TeardownEntry {
    pub(crate) key: ServiceKey,
    pub(crate) instance: Instance,
    pub(crate) disposer: Option<Hook>,
}

pub struct Scope {
    id: Uuid,
    /// 所属容器，用于拒绝其他容器的作用域
    owner: Uuid,
    name: Arc<str>,
    parent: Option<ScopeHandle>,
    /// 单飞构造槽：同一个键的并发首次解析只会构造一次
    slots: DashMap<ServiceKey, Arc<OnceCell<Instance>>>,
    /// 按构造完成的顺序记录
    teardown: Mutex<Vec<TeardownEntry>>,
    state: RwLock<ScopeState>,
    active_children: AtomicUsize,
    created_at: Instant,
}

/// 作用域的共享句柄
#[derive(Clone)]
pub struct ScopeHandle(Arc<Scope>);

impl Deref for ScopeHandle {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.0
    }
}

impl PartialEq for ScopeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ScopeHandle {}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// 作用域快照
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: Uuid,
    pub name: String,
    pub state: ScopeState,
    pub parent_id: Option<Uuid>,
    pub depth: usize,
    pub cached_instances: usize,
    pub active_children: usize,
    pub age: Duration,
}

impl Scope {
    fn new(owner: Uuid, name: Arc<str>, parent: Option<ScopeHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name,
            parent,
            slots: DashMap::new(),
            teardown: Mutex::new(Vec::new()),
            state: RwLock::new(ScopeState::Active),
            active_children: AtomicUsize::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&ScopeHandle> {
        self.parent.as_ref()
    }

    pub fn state(&self) -> ScopeState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ScopeState::Active
    }

    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }

    /// 已缓存的实例数量
    pub fn cached_instances(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn info(&self) -> ScopeInfo {
        ScopeInfo {
            id: self.id,
            name: self.name.to_string(),
            state: self.state(),
            parent_id: self.parent.as_ref().map(|parent| parent.id),
            depth: self.depth(),
            cached_instances: self.cached_instances(),
            active_children: self.active_children.load(Ordering::SeqCst),
            age: self.created_at.elapsed(),
        }
    }

    pub(crate) fn owner(&self) -> Uuid {
        self.owner
    }

    pub(crate) fn cached(&self, key: &ServiceKey) -> Option<Instance> {
        self.slots.get(key).and_then(|slot| slot.value().get().cloned())
    }

    pub(crate) fn slot(&self, key: &ServiceKey) -> Arc<OnceCell<Instance>> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// 单飞槽是否正被其他调用者初始化
    pub(crate) fn is_constructing(&self, key: &ServiceKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| !slot.value().initialized() && Arc::strong_count(slot.value()) > 1)
    }

    /// 记录新构造的实例，作用域已不再活动时拒绝
    pub(crate) fn record(&self, entry: TeardownEntry) -> ContainerResult<()> {
        let state = self.state.read();
        if *state != ScopeState::Active {
            return Err(ContainerError::scope_error(
                &self.name,
                "record_instance",
                format!("Cannot cache '{}' in scope with state {:?}", entry.key, *state),
            ));
        }
        self.teardown.lock().push(entry);
        Ok(())
    }

    /// 按构造的逆序销毁实例，所有销毁错误汇总后一起返回
    pub(crate) async fn close(&self, force: bool) -> ContainerResult<()> {
        {
            let mut state = self.state.write();
            if *state != ScopeState::Active {
                return Err(ContainerError::scope_error(
                    &self.name,
                    "exit_scope",
                    format!("Cannot end scope in state {:?}", *state),
                ));
            }
            let children = self.active_children.load(Ordering::SeqCst);
            if children > 0 && !force {
                return Err(ContainerError::scope_error(
                    &self.name,
                    "exit_scope",
                    format!("Cannot end scope with {children} active child scopes"),
                ));
            }
            *state = ScopeState::Ending;
        }

        let entries = std::mem::take(&mut *self.teardown.lock());
        debug!(scope = %self.name, instances = entries.len(), "tearing down scope");

        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            let Some(disposer) = &entry.disposer else {
                continue;
            };
            if let Err(error) = disposer.run(&entry.instance).await {
                warn!(scope = %self.name, key = %entry.key, %error, "dispose failed");
                failures.push(DisposalFailure { key: entry.key, error });
            }
        }

        self.slots.clear();
        *self.state.write() = ScopeState::Ended;
        if let Some(parent) = &self.parent {
            parent.active_children.fetch_sub(1, Ordering::SeqCst);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::DisposalFailed {
                scope: self.name.to_string(),
                failures,
            })
        }
    }
}

impl ScopeHandle {
    pub(crate) fn root(owner: Uuid, name: &str) -> Self {
        ScopeHandle(Arc::new(Scope::new(owner, name.into(), None)))
    }

    /// 创建子作用域，父作用域必须处于活动状态
    pub(crate) fn child(&self, name: &str) -> ContainerResult<ScopeHandle> {
        let state = self.state.read();
        if *state != ScopeState::Active {
            return Err(ContainerError::scope_error(
                name,
                "enter_scope",
                format!("Parent scope '{}' is not active ({:?})", self.name, *state),
            ));
        }
        self.active_children.fetch_add(1, Ordering::SeqCst);
        drop(state);
        Ok(ScopeHandle(Arc::new(Scope::new(self.owner, name.into(), Some(self.clone())))))
    }

    /// 从当前作用域开始沿父链查找最近的同名作用域
    pub fn find_nearest(&self, name: &str) -> Option<ScopeHandle> {
        let mut cursor = Some(self.clone());
        while let Some(scope) = cursor {
            if scope.name() == name {
                return Some(scope);
            }
            cursor = scope.parent.clone();
        }
        None
    }

    /// 当前任务激活的作用域
    pub fn current() -> Option<ScopeHandle> {
        ACTIVE_SCOPE.try_with(|scope| scope.clone()).ok()
    }

    /// 在该作用域激活的情况下运行 future
    pub async fn activate<F: Future>(&self, future: F) -> F::Output {
        ACTIVE_SCOPE.scope(self.clone(), future).await
    }
}

/// 作用域守卫：调用 `exit` 结束作用域
///
/// 未调用 `exit` 就被丢弃时（取消或 panic），销毁工作会交给当前的 tokio 运行时。
#[must_use = "a scope guard must be exited to dispose its instances"]
pub struct ScopeGuard {
    scope: ScopeHandle,
    armed: bool,
}

impl ScopeGuard {
    pub(crate) fn new(scope: ScopeHandle) -> Self {
        Self { scope, armed: true }
    }

    pub fn handle(&self) -> &ScopeHandle {
        &self.scope
    }

    /// 在该作用域激活的情况下运行 future，期间 `resolve` 使用该作用域
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        self.scope.activate(future).await
    }

    pub async fn exit(mut self) -> ContainerResult<()> {
        self.armed = false;
        debug!(scope = %self.scope.name(), id = %self.scope.id(), "exiting scope");
        self.scope.close(false).await
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.armed || !self.scope.is_active() {
            return;
        }
        let scope = self.scope.clone();
        warn!(scope = %scope.name(), "scope guard dropped without exit; disposing in background");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(error) = scope.close(true).await {
                        warn!(scope = %scope.name(), %error, "background scope teardown failed");
                    }
                });
            }
            Err(_) => {
                // 没有运行时只能同步推进，异步销毁钩子会被跳过
                if scope.close(true).now_or_never().is_none() {
                    warn!(scope = %scope.name(), "scope teardown needs a runtime; some disposers did not run");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::lifecycle::Dispose;
    use crate::errors::BoxError;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Dispose for Recorder {
        fn dispose(&self) -> Result<(), BoxError> {
            self.log.lock().push(self.label);
            if self.fail {
                return Err(format!("{} refused to close", self.label).into());
            }
            Ok(())
        }
    }

    fn entry(label: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> TeardownEntry {
        let instance: Instance = Arc::new(Recorder {
            label,
            log: log.clone(),
            fail,
        });
        TeardownEntry {
            key: ServiceKey::named::<Recorder>(label),
            instance,
            disposer: Some(Hook::disposer::<Recorder>()),
        }
    }

    #[tokio::test]
    async fn close_disposes_in_reverse_order_and_collects_errors() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let request = root.child("request").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        request.record(entry("c", &log, false)).unwrap();
        request.record(entry("b", &log, true)).unwrap();
        request.record(entry("a", &log, false)).unwrap();

        let err = request.close(false).await.unwrap_err();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        match err {
            ContainerError::DisposalFailed { scope, failures } => {
                assert_eq!(scope, "request");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].key, ServiceKey::named::<Recorder>("b"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(request.state(), ScopeState::Ended);
        assert_eq!(root.info().active_children, 0);
    }

    #[tokio::test]
    async fn ended_scope_rejects_records_and_children() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let scope = root.child("request").unwrap();
        scope.close(false).await.unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        assert!(matches!(scope.record(entry("x", &log, false)), Err(ContainerError::ScopeError { .. })));
        assert!(scope.child("nested").is_err());
        assert!(scope.close(false).await.is_err());
    }

    #[tokio::test]
    async fn parent_with_active_children_cannot_close() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let parent = root.child("session").unwrap();
        let child = parent.child("request").unwrap();

        let err = parent.close(false).await.unwrap_err();
        assert!(err.to_string().contains("active child scopes"));

        child.close(false).await.unwrap();
        parent.close(false).await.unwrap();
    }

    #[tokio::test]
    async fn find_nearest_walks_parent_chain() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let outer = root.child("request").unwrap();
        let inner = outer.child("request").unwrap();
        let leaf = inner.child("batch").unwrap();

        assert_eq!(leaf.find_nearest("request"), Some(inner.clone()));
        assert_eq!(leaf.find_nearest("singleton"), Some(root.clone()));
        assert!(leaf.find_nearest("session").is_none());
        assert_eq!(leaf.depth(), 3);
    }

    #[tokio::test]
    async fn activation_is_task_local() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let scope = root.child("request").unwrap();

        assert!(ScopeHandle::current().is_none());
        let seen = scope.activate(async { ScopeHandle::current() }).await;
        assert_eq!(seen, Some(scope.clone()));

        let other_task = scope
            .activate(async { tokio::spawn(async { ScopeHandle::current() }).await.unwrap() })
            .await;
        assert!(other_task.is_none());
    }

    #[tokio::test]
    async fn dropped_guard_disposes_in_background() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let scope = root.child("request").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        scope.record(entry("only", &log, false)).unwrap();

        drop(ScopeGuard::new(scope.clone()));
        for _ in 0..10 {
            if scope.state() == ScopeState::Ended {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(scope.state(), ScopeState::Ended);
        assert_eq!(*log.lock(), vec!["only"]);
    }

    #[test]
    fn dropped_guard_without_runtime_runs_sync_disposers() {
        let root = ScopeHandle::root(Uuid::new_v4(), "singleton");
        let scope = root.child("request").unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        scope.record(entry("sync", &log, false)).unwrap();
        assert_eq!(scope.cached_instances(), 0);

        drop(ScopeGuard::new(scope.clone()));
        assert_eq!(scope.state(), ScopeState::Ended);
        assert_eq!(*log.lock(), vec!["sync"]);
    }
}
