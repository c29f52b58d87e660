//! 매니페스트 파서 벤치마크
//!
//! 형식별 파싱, 로컬 advisory DB 조회 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vulnwatch_core::types::{DependencyRecord, Ecosystem};
use vulnwatch_scanner::{LocalDbSource, ManifestFormat, parse_manifest};

fn package_json(count: usize) -> String {
    let deps: Vec<String> = (0..count)
        .map(|i| format!("\"package-{i}\": \"^1.{i}.0\""))
        .collect();
    format!("{{ \"name\": \"bench\", \"dependencies\": {{ {} }} }}", deps.join(", "))
}

fn package_lock(count: usize) -> String {
    let entries: Vec<String> = (0..count)
        .map(|i| format!("\"node_modules/package-{i}\": {{ \"version\": \"1.{i}.0\" }}"))
        .collect();
    format!(
        "{{ \"lockfileVersion\": 3, \"packages\": {{ \"\": {{ \"name\": \"bench\" }}, {} }} }}",
        entries.join(", ")
    )
}

fn requirements(count: usize) -> String {
    (0..count)
        .map(|i| format!("Package_{i}==1.{i}.0\n"))
        .collect()
}

fn pom(count: usize) -> String {
    let deps: String = (0..count)
        .map(|i| {
            format!(
                "<dependency><groupId>org.bench</groupId><artifactId>lib-{i}</artifactId><version>${{lib.version}}</version></dependency>"
            )
        })
        .collect();
    format!(
        "<project><properties><lib.version>2.0.{count}</lib.version></properties><dependencies>{deps}</dependencies></project>"
    )
}

fn cargo_lock(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "[[package]]\nname = \"crate-{i}\"\nversion = \"0.{i}.0\"\nsource = \"registry+https://github.com/rust-lang/crates.io-index\"\n\n"
            )
        })
        .collect()
}

fn bench_manifest_parsing(c: &mut Criterion) {
    let inputs = [
        (ManifestFormat::PackageJson, package_json(100)),
        (ManifestFormat::PackageLock, package_lock(100)),
        (ManifestFormat::Requirements, requirements(100)),
        (ManifestFormat::Pom, pom(100)),
        (ManifestFormat::CargoLock, cargo_lock(100)),
    ];

    let mut group = c.benchmark_group("manifest_parsing");
    group.throughput(Throughput::Elements(100));
    for (format, content) in &inputs {
        group.bench_with_input(
            BenchmarkId::from_parameter(format.to_string()),
            content,
            |b, content| b.iter(|| parse_manifest(black_box(content.as_bytes()), *format).unwrap()),
        );
    }
    group.finish();
}

fn bench_package_lock_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("package_lock_scaling");
    for size in &[10usize, 100, 1000] {
        let content = package_lock(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                parse_manifest(black_box(content.as_bytes()), ManifestFormat::PackageLock).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_local_db_lookup(c: &mut Criterion) {
    let entries: Vec<String> = (0..1000)
        .map(|i| {
            format!(
                r#"{{"id":"GHSA-{i:04}","package":"package-{i}","ecosystem":"npm","affected_ranges":[{{"introduced":"0","fixed":"1.{i}.1"}}],"severity":"HIGH"}}"#
            )
        })
        .collect();
    let json = format!("[{}]", entries.join(","));
    let db = LocalDbSource::from_json("bench", &json).unwrap();

    let hit = DependencyRecord::new("package-42", "1.42.0", Ecosystem::Npm);
    let miss = DependencyRecord::new("nonexistent-pkg", "1.0.0", Ecosystem::Npm);

    let mut group = c.benchmark_group("local_db_lookup");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_hit", |b| b.iter(|| db.lookup(black_box(&hit))));
    group.bench_function("miss", |b| b.iter(|| db.lookup(black_box(&miss))));
    group.finish();
}

criterion_group!(
    benches,
    bench_manifest_parsing,
    bench_package_lock_scaling,
    bench_local_db_lookup,
);
criterion_main!(benches);
