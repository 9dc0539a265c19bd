//! Basic hello_world example for cotile
//!
//! Runs `loss = sum(tanh(A @ B))` on one cube of 16 units, then walks the
//! same graph backwards to get `d loss / dA` and `d loss / dB`.
//!
//! Set `RUST_LOG=cotile=debug` to see launches.

use cotile::{
    prelude::*,
    test_utils::{DeviceTensor, TestRuntime, client},
};
use cubecl::prelude::*;
use tracing::info;

const CONFIG: &str = r#"
name = "hello"
shared_mem_bytes = 16384
poison_shared = true
"#;

type Tile8 = St<f32, D8, D8, D16>;

#[cube(launch)]
fn tanh_matmul_loss(
    a: &Tensor<f32>,
    b: &Tensor<f32>,
    product: &mut Tensor<f32>,
    loss: &mut Tensor<f32>,
    adj_a_out: &mut Tensor<Atomic<f32>>,
    adj_b_out: &mut Tensor<Atomic<f32>>,
    #[comptime] poison: bool,
) {
    // Forward
    let mut st_a = Tile8::empty(poison);
    let mut st_b = Tile8::empty(poison);
    st_a.load(a, &tile_load_2d(0, 0));
    st_b.load(b, &tile_load_2d(0, 0));

    let st_c = tile_matmul_out::<f32, D8, D8, D8, D16, ReferenceGemm>(ReferenceGemm, &st_a, &st_b);
    tile_store_2d::<f32, D8, D8, D16, Tile8>(product, 0, 0, &st_c);

    let activated = tile_map::<f32, D8, D8, D16, Tile8, TanhOp>(TanhOp, &st_c);
    let total = tile_sum::<f32, D8, D8, D16, Rt<f32, D8, D8, D16>>(&activated);
    if UNIT_POS == 0 {
        loss[0] = total.data[0];
    }

    // Backward, seeded with d loss / d loss = 1
    let adj_total = Rt::<f32, D1, D1, D16>::filled(1.0);
    let mut adj_activated = Rt::<f32, D8, D8, D16>::new();
    adj_tile_sum::<f32, D8, D8, D16, Rt<f32, D8, D8, D16>, Rt<f32, D1, D1, D16>>(&mut adj_activated, &adj_total);

    let mut adj_c = Tile8::zeros();
    adj_tile_map::<f32, D8, D8, D16, Tile8, Tile8, Rt<f32, D8, D8, D16>, TanhOp>(
        TanhOp,
        &st_c,
        &mut adj_c,
        &adj_activated,
    );

    let mut adj_a = Tile8::zeros();
    let mut adj_b = Tile8::zeros();
    adj_tile_matmul::<f32, D8, D8, D8, D16, ReferenceGemm>(ReferenceGemm, &st_a, &st_b, &mut adj_a, &mut adj_b, &adj_c);

    adj_tile_load_2d::<f32, D8, D8, D16, Tile8>(adj_a_out, 0, 0, &adj_a);
    adj_tile_load_2d::<f32, D8, D8, D16, Tile8>(adj_b_out, 0, 0, &adj_b);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // inputs, the product, adjoints of both products and of the two inputs
    let launch = (0..6).try_fold(
        BlockLaunch::<D16>::new(BlockConfig::from_toml_str(CONFIG)?)?,
        |launch, _| launch.with_shared_tile::<f32, D8, D8>(),
    )?;
    info!(
        name = %launch.config().name,
        shared_bytes = launch.shared_bytes(),
        "Hello cotile!"
    );

    let client = client();
    let a_host: Vec<f32> = (0..64).map(|i| (i % 8) as f32 * 0.1).collect();
    let b_host: Vec<f32> = (0..64).map(|i| if i % 9 == 0 { 0.5 } else { 0.0 }).collect();
    let a = DeviceTensor::from_slice(&client, &a_host, &[8, 8]);
    let b = DeviceTensor::from_slice(&client, &b_host, &[8, 8]);
    let product = DeviceTensor::<f32>::zeros(&client, &[8, 8]);
    let loss = DeviceTensor::<f32>::zeros(&client, &[1]);
    let grad_a = DeviceTensor::<f32>::zeros(&client, &[8, 8]);
    let grad_b = DeviceTensor::<f32>::zeros(&client, &[8, 8]);

    launch.run(|count, dim| {
        tanh_matmul_loss::launch::<TestRuntime>(
            &client,
            count,
            dim,
            a.arg(),
            b.arg(),
            product.arg(),
            loss.arg(),
            grad_a.arg(),
            grad_b.arg(),
            launch.config().poison_shared,
        )
    })?;

    println!("\n=== A @ B ===");
    let product = product.read(&client);
    for row in 0..8 {
        println!("Row {row}: {:?}", &product[row * 8..(row + 1) * 8]);
    }

    println!("\nloss = sum(tanh(A @ B)) = {}", loss.read(&client)[0]);

    let grad_a = grad_a.read(&client);
    println!("\n=== d loss / dA ===");
    for row in 0..8 {
        println!("Row {row}: {:?}", &grad_a[row * 8..(row + 1) * 8]);
    }

    let grad_b = grad_b.read(&client);
    println!("\n=== d loss / dB (diagonal) ===");
    println!("{:?}", (0..8).map(|i| grad_b[i * 9]).collect::<Vec<_>>());

    Ok(())
}
