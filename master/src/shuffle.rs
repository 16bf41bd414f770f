// master/src/shuffle.rs

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use common::Counts;

/// Shard destino de una clave. Estable dentro de una misma corrida;
/// nunca se persiste ni se compara entre versiones.
pub fn shard_for(key: &str, num_shards: usize) -> usize {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    (h.finish() % num_shards.max(1) as u64) as usize
}

/// Shuffle: reparte las claves de todos los parciales en R shards por
/// hash(clave) % R, sumando los valores de una misma clave.
pub fn partition(partials: &[Counts], num_shards: usize) -> Vec<Counts> {
    let r = num_shards.max(1);
    let mut shards: Vec<Counts> = vec![Counts::new(); r];

    for partial in partials {
        for (key, count) in partial {
            *shards[shard_for(key, r)].entry(key.clone()).or_insert(0) += count;
        }
    }

    shards
}
