//! The agent: a character plus its route table.
//!
//! Routes are registered during setup through `&mut Agent`. Once the agent
//! is wrapped in an `Arc` for serving, the table can no longer change.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::RngCore;
use steward_config::PersonaSampling;
use steward_core::error::RoutingError;
use steward_core::persona::Character;
use tracing::debug;

use crate::router::{Route, RouteRegistry};

/// Entries drawn from each persona list.
const PERSONA_SAMPLE: usize = 3;

pub struct Agent {
    character: Character,
    routes: RouteRegistry,
    sampling: PersonaSampling,
}

impl Agent {
    pub fn new(character: Character) -> Self {
        Self {
            character,
            routes: RouteRegistry::default(),
            sampling: PersonaSampling::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: PersonaSampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Register a route. A name that is already taken is rejected and the
    /// existing route is kept.
    pub fn add_route(&mut self, route: Route) -> Result<(), RoutingError> {
        debug!(agent_id = %self.character.agent_id, route = %route.name, "Registering route");
        self.routes.add(route)
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn agent_id(&self) -> &str {
        &self.character.agent_id
    }

    pub fn system_prompt(&self) -> &str {
        &self.character.system
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    /// Render the persona snapshot placed in every prompt.
    pub fn agent_context(&self) -> String {
        let mut sampler = match self.sampling {
            PersonaSampling::All => Sampler::All,
            PersonaSampling::Seeded(seed) => Sampler::Random(Box::new(StdRng::seed_from_u64(seed))),
            PersonaSampling::Random => Sampler::Random(Box::new(rand::rng())),
        };
        let c = &self.character;

        let conversations = sampler
            .pick(&c.message_examples)
            .into_iter()
            .map(|conversation| {
                conversation
                    .iter()
                    .map(|m| format!("{}: {}", m.user, m.text))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Bio Context:\n{bio}\n\n\
             Lore Context:\n{lore}\n\n\
             Example Interactions:\n{conversations}\n\n\
             Example Posts:\n{posts}\n\n\
             Areas of Expertise:\n{topics}\n\n\
             Style Guidelines:\n\
             General: {style_all}\n\
             Chat: {style_chat}\n\
             Post: {style_post}\n\n\
             Character Traits:\n{adjectives}",
            bio = sampler.join(&c.bio, "\n"),
            lore = sampler.join(&c.lore, "\n"),
            posts = sampler.join(&c.post_examples, "\n"),
            topics = sampler.join(&c.topics, "\n"),
            style_all = sampler.join(&c.style.all, "\n"),
            style_chat = sampler.join(&c.style.chat, "\n"),
            style_post = sampler.join(&c.style.post, "\n"),
            adjectives = sampler.join(&c.adjectives, ", "),
        )
        .trim()
        .to_string()
    }
}

enum Sampler {
    All,
    Random(Box<dyn RngCore>),
}

impl Sampler {
    fn pick<'c, T>(&mut self, items: &'c [T]) -> Vec<&'c T> {
        match self {
            Self::All => items.iter().collect(),
            Self::Random(rng) => items.choose_multiple(rng.as_mut(), PERSONA_SAMPLE).collect(),
        }
    }

    fn join(&mut self, items: &[String], separator: &str) -> String {
        self.pick(items)
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }
}
