use archetypes::chi2::{compute_chi2, Chi2Options};
use archetypes::selection::{ArchetypeSelector, SelectionParams};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use test_helpers::clustered_spectra;

fn make_flux(groups: usize, per_group: usize, npix: usize) -> Array2<f64> {
    let rows = clustered_spectra(groups, per_group, npix);
    Array2::from_shape_vec(
        (rows.len(), npix),
        rows.into_iter().flatten().collect(),
    )
    .unwrap()
}

fn bench_compute_chi2(c: &mut Criterion) {
    let small = make_flux(10, 20, 2000);
    let large = make_flux(20, 25, 4000);

    let mut group = c.benchmark_group("compute_chi2");
    group.sample_size(10);
    group.bench_function("200_spectra_2000_pix", |b| {
        b.iter(|| compute_chi2(black_box(&small), None, Chi2Options::default()))
    });
    group.bench_function("500_spectra_4000_pix", |b| {
        b.iter(|| compute_chi2(black_box(&large), None, Chi2Options::default()))
    });
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let flux = make_flux(20, 25, 1000);
    let chi2 = compute_chi2(&flux, None, Chi2Options::default()).unwrap().chi2;
    let params = SelectionParams {
        chi2_threshold: 0.05,
        ..SelectionParams::default()
    };

    c.bench_function("select_500_spectra", |b| {
        b.iter(|| {
            ArchetypeSelector::new(black_box(&chi2))
                .unwrap()
                .select(&params)
        })
    });
}

criterion_group!(benches, bench_compute_chi2, bench_select);
criterion_main!(benches);
