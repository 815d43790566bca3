//! Environment source: PARLEY_<SECTION>__<KEY>, e.g. PARLEY_ALLOCATOR__BLOCK_SIZE=50

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "PARLEY";
pub const ENV_SEPARATOR: &str = "__";

/// Add the environment override layer to builder.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("assembly.model_roles"),
    )
}
