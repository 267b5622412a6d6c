//! Latency of building merged type views over a chain of includes.
//!
//! `cold` flushes the merger cache before every build; `warm` measures the
//! cache-hit path that hover and completion take on repeated requests.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use miniscript_lsp::core::{Configuration, MergeStrategy, Session};
use miniscript_lsp::testing::MockFileSystem;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// `main.ms` includes `f0.ms`, which includes `f1.ms`, and so on.
fn include_chain(files: usize) -> MockFileSystem {
    let fs = MockFileSystem::new().with_workspace_folder("file:///bench");
    for i in 0..files {
        let include = if i + 1 < files {
            format!("include \"f{}\"\n", i + 1)
        } else {
            String::new()
        };
        let body = format!(
            "{include}value{i} = {i}\nfn{i} = function(a, b)\n  return a + b * {i}\nend function\nmap{i} = {{\"key\": \"v\", \"n\": {i}}}\n"
        );
        fs.add(&format!("file:///bench/f{i}.ms"), &body);
    }
    fs.add("file:///bench/main.ms", "include \"f0\"\nresult = fn0(1, 2)");
    fs
}

fn session(runtime: &Runtime, files: usize, strategy: MergeStrategy) -> Arc<Session> {
    let _guard = runtime.enter();
    let mut configuration = Configuration::default();
    configuration.type_analyzer.strategy = strategy;
    Session::new(Arc::new(include_chain(files)), configuration)
}

fn bench_merges(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("merge");

    for files in [4, 16, 64] {
        for strategy in [MergeStrategy::Dependency, MergeStrategy::Workspace] {
            let session = session(&runtime, files, strategy);
            let main = runtime
                .block_on(session.document_manager().get_or_open("file:///bench/main.ms"))
                .expect("main document");

            group.bench_with_input(
                BenchmarkId::new(format!("cold/{strategy:?}"), files),
                &files,
                |b, _| {
                    b.iter(|| {
                        session.merger_cache().flush_cache();
                        black_box(runtime.block_on(session.merged_type_document(&main)))
                    })
                },
            );

            group.bench_with_input(
                BenchmarkId::new(format!("warm/{strategy:?}"), files),
                &files,
                |b, _| b.iter(|| black_box(runtime.block_on(session.merged_type_document(&main)))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_merges);
criterion_main!(benches);
