use cucumber::given;
use marketplace_engine::events::EventProducers;

use crate::{cucumber::MarketplaceWorld, support::Marketplace};

#[given("a fresh marketplace")]
async fn fresh_marketplace(world: &mut MarketplaceWorld) {
    let system = Marketplace::new(EventProducers::default()).await;
    world.system = Some(system);
}
