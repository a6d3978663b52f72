use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use pointprep_3d::{
    filter::remove_statistical_outlier, kdtree::KdTreeSearchParam, normals::estimate_normals,
    pointcloud::PointCloud, voxel_grid::voxel_down_sample,
};

fn random_cloud(num_points: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(0);
    let points = (0..num_points)
        .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
        .collect();
    PointCloud::new(points, None, None)
}

fn bench_statistical_outlier(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_statistical_outlier");

    for num_points in [1000, 10000, 100000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let cloud = random_cloud(*num_points);

        group.bench_with_input(
            BenchmarkId::new("nb_neighbors_16", num_points),
            &cloud,
            |b, cloud| {
                b.iter(|| black_box(remove_statistical_outlier(cloud, 16, 10.0)));
            },
        );
    }
}

fn bench_voxel_down_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("voxel_down_sample");

    for num_points in [1000, 10000, 100000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let cloud = random_cloud(*num_points);

        for voxel_size in [0.01, 0.1] {
            group.bench_with_input(
                BenchmarkId::new(format!("voxel_{voxel_size}"), num_points),
                &cloud,
                |b, cloud| {
                    b.iter(|| black_box(voxel_down_sample(cloud, voxel_size)));
                },
            );
        }
    }
}

fn bench_estimate_normals(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate_normals");

    for num_points in [1000, 10000].iter() {
        group.throughput(criterion::Throughput::Elements(*num_points as u64));
        let cloud = random_cloud(*num_points);
        let search = KdTreeSearchParam::Hybrid {
            radius: 0.1,
            max_nn: 16,
        };

        for fast in [true, false] {
            group.bench_with_input(
                BenchmarkId::new(if fast { "closed_form" } else { "jacobi" }, num_points),
                &cloud,
                |b, cloud| {
                    b.iter(|| {
                        let mut cloud = cloud.clone();
                        estimate_normals(&mut cloud, search, fast);
                        black_box(cloud);
                    });
                },
            );
        }
    }
}

criterion_group!(
    benches,
    bench_statistical_outlier,
    bench_voxel_down_sample,
    bench_estimate_normals
);
criterion_main!(benches);
