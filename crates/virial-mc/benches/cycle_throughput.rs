use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use virial_cluster::graphs::virial_cluster;
use virial_cluster::{hard_sphere, ClusterValue, HardSphere};

use virial_mc::{run, RunConfig, VirialSystem};

fn hard_spheres(n: usize, sigma: f64) -> ClusterValue {
    virial_cluster(n, Arc::new(HardSphere::new(sigma))).unwrap().into()
}

fn bench_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.steps = 10_000;
    config.calibration.equilibration_steps = Some(2_000);
    config.calibration.alpha_steps = Some(2_000);
    config.calibration.alpha_count = 5;
    config.output.run_directory = None;
    config.checkpoint.directory = None;
    config
}

fn bench_cycles(c: &mut Criterion) {
    let config = bench_config();
    for order in [2usize, 4] {
        let reference = hard_spheres(order, 1.0);
        let target = hard_spheres(order, 0.9);
        let integral = hard_sphere::virial(order, 1.0).unwrap();
        c.bench_function(&format!("hs_b{order}_overlap_run"), |b| {
            b.iter(|| {
                let system =
                    VirialSystem::new(reference.clone(), target.clone(), integral).unwrap();
                let _ = run(&config, system).unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_cycles);
criterion_main!(benches);
