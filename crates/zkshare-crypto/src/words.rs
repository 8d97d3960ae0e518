//! Fixed 256-word list shared by pairing codes and verification phrases.
//!
//! One byte indexes one word, so the list length is part of the wire format:
//! reordering or replacing entries breaks phrase agreement with older peers.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::keys::ShareKey;

/// Words in a verification phrase
pub const PHRASE_WORDS: usize = 3;

/// Separator between phrase words
pub const PHRASE_SEPARATOR: &str = " ";

pub static WORDS: [&str; 256] = [
    "ACORN", "AGATE", "ALPINE", "AMBER", "ANCHOR", "ANVIL", "APEX", "ARCHER",
    "ARROW", "ASPEN", "ATLAS", "AURORA", "AVALON", "BADGER", "BAMBOO", "BANJO",
    "BARLEY", "BASALT", "BEACON", "BEAVER", "BIRCH", "BISON", "BLAZE", "BOULDER",
    "BRAMBLE", "BRONZE", "BUCKLE", "BUTTON", "CACTUS", "CANDLE", "CANYON", "CARBON",
    "CASTLE", "CEDAR", "CELLO", "CHALK", "CHERRY", "CINDER", "CIRRUS", "CLOVER",
    "COBALT", "COMET", "CONDOR", "CORAL", "COTTON", "COUGAR", "COYOTE", "CRANE",
    "CRATER", "CRICKET", "CRYSTAL", "CYPRESS", "DAISY", "DELTA", "DESERT", "DOLPHIN",
    "DRAGON", "DRIFT", "DUNE", "EAGLE", "EBONY", "ECHO", "EMBER", "EMERALD",
    "ENIGMA", "FALCON", "FERN", "FIDDLE", "FIG", "FJORD", "FLINT", "FOREST",
    "FOSSIL", "FOX", "FROST", "GALAXY", "GANDALF", "GARNET", "GECKO", "GEYSER",
    "GINGER", "GLACIER", "GOBLIN", "GRANITE", "GRIFFIN", "GROVE", "HARBOR", "HAWK",
    "HAZEL", "HELIX", "HERON", "HICKORY", "HOLLOW", "HONEY", "HORIZON", "HYDRA",
    "IBIS", "ICEBERG", "INDIGO", "IRIS", "IVORY", "JADE", "JAGUAR", "JASMINE",
    "JESTER", "JUNIPER", "KAYAK", "KELP", "KESTREL", "KOALA", "LAGOON", "LANTERN",
    "LARCH", "LAUREL", "LEMUR", "LICHEN", "LILAC", "LINEN", "LOTUS", "LYNX",
    "MAGNET", "MAGPIE", "MANGO", "MAPLE", "MARBLE", "MEADOW", "MERLIN", "MESA",
    "METEOR", "MINNOW", "MOSAIC", "MOSS", "NEBULA", "NECTAR", "NEEDLE", "NIMBUS",
    "NUTMEG", "OAK", "OASIS", "OBSIDIAN", "OCELOT", "OLIVE", "ONYX", "OPAL",
    "ORBIT", "ORCHID", "OSPREY", "OTTER", "OWL", "OXIDE", "PAPRIKA", "PARROT",
    "PEBBLE", "PELICAN", "PEPPER", "PHOENIX", "PINE", "PIXEL", "PLANET", "PLUM",
    "POLAR", "POPPY", "PRAIRIE", "PRISM", "PUFFIN", "PUMA", "QUARTZ", "QUASAR",
    "QUILL", "RADISH", "RAVEN", "REEF", "RIDGE", "RIVER", "ROBIN", "ROCKET",
    "RUBY", "SABLE", "SAFFRON", "SAGE", "SALMON", "SAPPHIRE", "SATURN", "SCARAB",
    "SEQUOIA", "SHADOW", "SHERPA", "SIERRA", "SILVER", "SPARROW", "SPHINX", "SPRUCE",
    "STORM", "SUMMIT", "SUNSET", "SWALLOW", "TALON", "TANGO", "TEMPEST", "THISTLE",
    "THUNDER", "TIGER", "TIMBER", "TOPAZ", "TORNADO", "TOUCAN", "TRIDENT", "TULIP",
    "TUNDRA", "TURTLE", "UMBER", "UNICORN", "URCHIN", "VALLEY", "VELVET", "VIOLET",
    "VIPER", "VOLCANO", "VORTEX", "WALNUT", "WALRUS", "WARBLER", "WILLOW", "WIZARD",
    "WOMBAT", "WREN", "YARROW", "YETI", "YUCCA", "ZEBRA", "ZENITH", "ZEPHYR",
    "ZINC", "ZIRCON", "ALDER", "BASIL", "BREEZE", "CANARY", "COMPASS", "DINGO",
    "ELM", "FLAMINGO", "GOPHER", "HAMMOCK", "IGUANA", "JUNCO", "KIWI", "LOBSTER",
    "MARMOT", "NARWHAL", "ORCA", "PANDA", "RAPTOR", "TAPIR", "VULTURE", "WHALE",
];

/// Pick a uniformly random pairing code.
pub fn random_word() -> &'static str {
    WORDS[rand::thread_rng().gen_range(0..WORDS.len())]
}

/// Canonical form of a pairing code for storage and comparison.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_word(code: &str) -> bool {
    let code = normalize_code(code);
    WORDS.iter().any(|w| *w == code)
}

/// Human-comparable phrase for a shared secret.
///
/// `SHA-256(secret)`, first three digest bytes each index [`WORDS`], joined
/// with a single ASCII space.
pub fn verification_phrase(secret: &ShareKey) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest[..PHRASE_WORDS]
        .iter()
        .map(|b| WORDS[*b as usize])
        .collect::<Vec<_>>()
        .join(PHRASE_SEPARATOR)
}
