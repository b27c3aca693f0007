//! Fixtures shared by the DistGuard benchmarks

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORDS: &[&str] = &[
    "post", "comment", "like", "feed", "user", "token", "render", "count", "title", "body",
];

/// A bundler-style script of roughly `size` bytes
pub fn generate_script(size: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = String::with_capacity(size + 256);
    let mut index = 0;
    while out.len() < size {
        let a = WORDS[rng.gen_range(0..WORDS.len())];
        let b = WORDS[rng.gen_range(0..WORDS.len())];
        out.push_str(&format!(
            "function {a}_{index}(items, options) {{\n  var total = 0;\n  var label = \"{a} {b}\";\n  for (var i = 0; i < items.length; i++) {{ total += items[i].{b}; }}\n  options.{a} = {{ {b}: total, label: label }};\n  console.log(label, total);\n  return options;\n}}\n"
        ));
        index += 1;
    }
    out
}

/// Write a fake site build under `root/dist` with `scripts` scripts and as many assets
pub fn build_site(root: &Path, scripts: usize, script_size: usize) -> Result<()> {
    let dist = root.join("dist");
    for i in 0..scripts {
        let dir = dist.join(format!("chunk-{}", i % 8));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        fs::write(dir.join(format!("script-{i}.js")), generate_script(script_size, i as u64))
            .context("Failed to write script")?;
        fs::write(dir.join(format!("image-{i}.png")), vec![i as u8; script_size])
            .context("Failed to write asset")?;
    }
    Ok(())
}
