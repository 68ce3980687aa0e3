use std::sync::Arc;
use tileswap::{CacheConfig, Result, SwapConfig, TileGrid};
use tracing_subscriber::EnvFilter;

/// A synthetic tiled image standing in for one band of a scene
struct SceneBand {
    name: &'static str,
    grid: TileGrid,
    tile_len: usize,
    seed: u8,
}

impl SceneBand {
    /// Deterministic tile content, so restored tiles can be verified
    fn render_tile(&self, x: u32, y: u32) -> Vec<u8> {
        let mut tile = vec![0u8; self.tile_len];
        for (i, px) in tile.iter_mut().enumerate() {
            *px = (i as u32)
                .wrapping_mul(31)
                .wrapping_add(x * 7 + y * 13 + self.seed as u32) as u8;
        }
        tile
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("tileswap - Swapping Tile Cache Simulation\n");

    let config = match std::env::args().nth(1) {
        Some(path) => CacheConfig::from_json_file(path)?,
        None => CacheConfig::default(),
    };

    println!("Memory Capacity: {} bytes", config.memory_capacity);
    println!("Memory Threshold: {}", config.memory_threshold);
    match &config.swap {
        SwapConfig::Memory { max_tiles } => println!("Swap: memory (max tiles: {:?})", max_tiles),
        SwapConfig::Disk { directory, compression } => println!(
            "Swap: disk ({}, {})",
            directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "temp dir".to_string()),
            compression.name()
        ),
    }

    let cache = config.build::<SceneBand>()?;

    let bands: Vec<Arc<SceneBand>> = ["B02", "B03", "B04"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Arc::new(SceneBand {
                name: *name,
                grid: TileGrid::new(16, 16),
                tile_len: 256 * 256,
                seed: i as u8,
            })
        })
        .collect();

    println!("\n1. Producing tiles for {} bands:", bands.len());
    for band in &bands {
        for (x, y) in band.grid.coords() {
            cache.add(band, x, y, band.render_tile(x, y));
        }
        let stats = cache.stats();
        println!(
            "   {}: {} resident, {} swapped, {} bytes in memory",
            band.name, stats.tile_count, stats.swapped_count, stats.memory_used
        );
    }

    println!("\n2. Reading all tiles back in raster order:");
    for band in &bands {
        let mut missing = 0;
        let mut corrupt = 0;
        for (x, y) in band.grid.coords() {
            match cache.get(band, x, y) {
                Some(tile) if *tile == band.render_tile(x, y) => {}
                Some(_) => corrupt += 1,
                None => missing += 1,
            }
        }
        println!("   {}: {} missing, {} corrupt", band.name, missing, corrupt);
    }

    println!("\n3. Cache statistics:");
    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("   Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    println!("\n4. Disposing bands:");
    for band in &bands {
        let removed = cache.remove_all_within(band, band.grid);
        println!("   {}: {} tiles removed", band.name, removed);
    }

    let stats = cache.stats();
    println!(
        "   Remaining: {} resident, {} swapped",
        stats.tile_count, stats.swapped_count
    );

    Ok(())
}
