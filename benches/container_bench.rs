#![allow(dead_code, clippy::uninlined_format_args)]
//! 容器解析的性能基准测试

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures_util::future;
use tokio::runtime::Runtime;
use wiring::{ServiceContainer, ServiceDescriptor};

#[derive(Clone)]
struct SimpleService {
    value: i32,
}

struct Layer0;
struct Layer1;
struct Layer2;
struct Layer3;

/// 四层依赖链：Layer0 -> Layer1 -> Layer2 -> Layer3
fn layered_container(top_lifetime_transient: bool) -> ServiceContainer {
    let container = ServiceContainer::new();
    let top = if top_lifetime_transient {
        ServiceDescriptor::transient::<Layer0>()
    } else {
        ServiceDescriptor::singleton::<Layer0>()
    };
    container
        .register(top.depends_on::<Layer1>("next").factory(|_| Ok(Layer0)))
        .unwrap();
    container
        .register(ServiceDescriptor::transient::<Layer1>().depends_on::<Layer2>("next").factory(|_| Ok(Layer1)))
        .unwrap();
    container
        .register(ServiceDescriptor::transient::<Layer2>().depends_on::<Layer3>("next").factory(|_| Ok(Layer2)))
        .unwrap();
    container
        .register(ServiceDescriptor::singleton::<Layer3>().factory(|_| Ok(Layer3)))
        .unwrap();
    container
}

/// 基准测试：单例与瞬态解析
fn bench_simple_service_resolution(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("simple_service_resolution");

    let singleton = ServiceContainer::new();
    singleton
        .register(ServiceDescriptor::singleton::<SimpleService>().factory(|_| Ok(SimpleService { value: 42 })))
        .unwrap();
    runtime.block_on(singleton.resolve::<SimpleService>()).unwrap();

    group.bench_function("singleton_cached", |b| {
        b.iter(|| runtime.block_on(async { black_box(singleton.resolve::<SimpleService>().await.unwrap().value) }));
    });

    let transient = ServiceContainer::new();
    transient
        .register(ServiceDescriptor::transient::<SimpleService>().factory(|_| Ok(SimpleService { value: 42 })))
        .unwrap();

    group.bench_function("transient", |b| {
        b.iter(|| runtime.block_on(async { black_box(transient.resolve::<SimpleService>().await.unwrap().value) }));
    });

    group.bench_function("transient_sync", |b| {
        b.iter(|| black_box(transient.resolve_sync::<SimpleService>().unwrap().value));
    });

    group.finish();
}

/// 基准测试：依赖链解析
fn bench_dependency_chain(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dependency_chain");

    let container = layered_container(true);
    group.bench_function("four_layers", |b| {
        b.iter(|| runtime.block_on(async { black_box(container.resolve::<Layer0>().await.is_ok()) }));
    });

    group.bench_function("check_four_layers", |b| {
        let key = wiring::ServiceKey::of::<Layer0>();
        b.iter(|| black_box(container.can_resolve(&key)));
    });

    group.finish();
}

/// 基准测试：并发解析性能
fn bench_concurrent_resolution(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_resolution");

    for concurrent_count in [10, 50, 100].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrent_count),
            concurrent_count,
            |b, &concurrent_count| {
                b.iter(|| {
                    runtime.block_on(async {
                        let container = ServiceContainer::new();
                        container
                            .register(
                                ServiceDescriptor::singleton::<SimpleService>()
                                    .factory(|_| Ok(SimpleService { value: 100 })),
                            )
                            .unwrap();

                        // 冷启动：所有任务竞争同一个单例槽位
                        let mut handles = Vec::new();
                        for _ in 0..concurrent_count {
                            let container_clone = container.clone();
                            handles.push(tokio::spawn(async move {
                                container_clone.resolve::<SimpleService>().await.unwrap().value
                            }));
                        }

                        let results = future::join_all(handles).await;
                        let sum: i32 = results.into_iter().map(|r| r.unwrap()).sum();
                        black_box(sum)
                    })
                });
            },
        );
    }

    group.finish();
}

/// 基准测试：作用域进入、解析、退出
fn bench_scope_cycle(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let container = ServiceContainer::new();
    container
        .register(ServiceDescriptor::scoped::<SimpleService>("request").factory(|_| Ok(SimpleService { value: 7 })))
        .unwrap();

    c.bench_function("scope_enter_resolve_exit", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let guard = container.enter_scope("request").unwrap();
                let service = container.resolve_in::<SimpleService>(guard.handle()).await.unwrap();
                guard.exit().await.unwrap();
                black_box(service.value)
            })
        });
    });
}

criterion_group!(
    benches,
    bench_simple_service_resolution,
    bench_dependency_chain,
    bench_concurrent_resolution,
    bench_scope_cycle
);
criterion_main!(benches);
