use annotext_engine::DisplayMode;
use criterion::{Criterion, criterion_group, criterion_main};
mod common;

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.sample_size(10);

    group.bench_function("full_build_2000_paragraphs", |b| {
        b.iter(|| {
            let mut controller = common::generate_controller(2_000);
            std::hint::black_box(controller.reconcile());
        });
    });

    group.bench_function("steady_state_pass", |b| {
        let mut controller = common::generate_controller(2_000);
        controller.reconcile();
        b.iter(|| {
            std::hint::black_box(controller.reconcile());
        });
    });

    group.bench_function("mode_toggle_incremental", |b| {
        let mut controller = common::generate_controller(2_000);
        controller.reconcile();
        let mut show = true;
        b.iter(|| {
            let mode = if show {
                DisplayMode::ShowTags
            } else {
                DisplayMode::Invisible
            };
            show = !show;
            controller.set_display_mode("ent", mode);
            std::hint::black_box(controller.reconcile());
        });
    });

    group.bench_function("single_edit_incremental", |b| {
        let mut controller = common::generate_controller(2_000);
        controller.reconcile();
        b.iter(|| {
            controller.insert_token(5_000, "x").unwrap();
            controller.remove_token(5_000).unwrap();
            std::hint::black_box(controller.reconcile());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
