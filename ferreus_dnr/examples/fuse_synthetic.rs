use ferreus_dnr::{
    TestFunctions, create_evaluation_grid, generate_random_points,
    driver::{default_regressor, fuse, FuseOptions},
    progress::{closure_sink, ProgressMsg},
    stats::performance_stats,
    table::Table,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Scatter 300 monitors over the unit square
    let sites = generate_random_points(300, 2, Some(42));

    // Monitors observe the true field; the background model is biased
    let mut fit = Table::from_mat(&["x", "y"], &sites)?;
    fit.insert_column(
        "obs",
        TestFunctions::pollutant_field(&sites).col(0).iter().copied().collect(),
    )?;
    fit.insert_column(
        "mod",
        TestFunctions::background_model(&sites, 0.8, 2.0).col(0).iter().copied().collect(),
    )?;

    // Build a 50 x 50 target grid carrying the background model
    let n = 50;
    let grid = create_evaluation_grid(&[(0.0, 1.0), (0.0, 1.0)], &[n, n]);
    let mut target = Table::from_mat(&["x", "y"], &grid)?;
    target.insert_column(
        "mod",
        TestFunctions::background_model(&grid, 0.8, 2.0).col(0).iter().copied().collect(),
    )?;

    // Print fold progress as it arrives
    let (sink, handle) = closure_sink(32, |msg| match msg {
        ProgressMsg::FoldComplete { fold, n_splits } => println!("fold {}/{}", fold + 1, n_splits),
        ProgressMsg::Message { message } => println!("{message}"),
        _ => {}
    });
    let callback = Some(sink);

    // Cross-validate, fit and predict onto the grid
    let options = FuseOptions::default();
    let mut regressor = default_regressor(&fit, &options);
    fuse(Some(&mut target), &mut fit, &mut regressor, &options, &callback)?;
    drop(callback);
    let _ = handle.join();

    // Compare the corrected surface and the background against the true field
    let truth: Vec<f64> = TestFunctions::pollutant_field(&grid).col(0).iter().copied().collect();
    let fused = performance_stats(target.column("bc_dnr")?, &truth)?;
    let background = performance_stats(target.column("mod")?, &truth)?;
    println!("background rmse {:.3}, fused rmse {:.3}", background.rmse, fused.rmse);

    target.write_csv("fused_grid.csv")?;

    Ok(())
}
