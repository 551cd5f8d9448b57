// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod scene;

use std::rc::Rc;

use anyhow::Result;
use keepsake_assets::{MaterialPromise, MemoryLoader, TextureSlot, Textures};
use keepsake_keeper::{KeepHandle, Keeper};
use scene::SceneDescription;
use tokio::task::LocalSet;

const SCENE: &str = include_str!("../scene.ron");

const SLOTS: [TextureSlot; 4] = [
    TextureSlot::Emission,
    TextureSlot::Alpha,
    TextureSlot::Base,
    TextureSlot::Bump,
];

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let scene = SceneDescription::parse(SCENE)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    LocalSet::new().block_on(&runtime, run(scene))
}

async fn run(scene: SceneDescription) -> Result<()> {
    let loader = Rc::new(MemoryLoader::new());
    scene.populate(&loader);

    let textures = Textures::new(Keeper::with_local_runner(scene.textures.clone()), loader.clone());
    let materials = Keeper::with_local_runner(scene.materials.clone());

    let mut entities: Vec<(String, KeepHandle<MaterialPromise>)> = Vec::new();
    for entity in &scene.entities {
        let handle = materials.keep(MaterialPromise::new(entity.material.clone(), textures.clone()));
        let name = entity.name.clone();
        let failed_name = entity.name.clone();
        handle
            .on_success(move |material| {
                let bound = SLOTS
                    .iter()
                    .filter(|slot| material.texture(**slot).is_some())
                    .count();
                log::info!(
                    "'{}' material ready: {} textures, queue {}, keywords {:?}",
                    name,
                    bound,
                    material.blend.render_queue,
                    material.keywords
                );
            })
            .on_fail(move |err| log::warn!("'{}' material problem: {}", failed_name, err));
        entities.push((entity.name.clone(), handle));
    }

    for (name, handle) in &entities {
        if !handle.settled().await.is_loaded() {
            log::warn!("'{}' has no material", name);
        }
    }
    log::info!(
        "{} materials and {} textures live, {} texture reads",
        materials.len(),
        textures.keeper().len(),
        loader.requests()
    );

    // Removing one of two entities that share a material keeps the material alive.
    if let Some((name, handle)) = entities.first() {
        materials.forget(handle)?;
        log::info!(
            "Removed '{}', its material is now kept {} time(s)",
            name,
            materials.ref_count(handle.key())
        );
    }

    for (_, handle) in entities.iter().skip(1) {
        materials.forget(handle)?;
    }
    materials.cleanup_all();
    textures.keeper().cleanup_all();

    log::info!("Material stats: {:?}", materials.stats());
    log::info!("Texture stats: {:?}", textures.keeper().stats());
    Ok(())
}
