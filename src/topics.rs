use std::io::Write;

use anyhow::Result;

use crate::collect::expand_home;
use crate::config::Config;

/// Print the configured topics and whether each root exists.
pub fn list_topics(config: &Config, out: &mut impl Write) -> Result<()> {
    if config.topics.is_empty() {
        writeln!(out, "No topics configured.")?;
        return Ok(());
    }

    writeln!(out, "{:<20} {:<10} {:<8} PATH", "TOPIC", "KIND", "EXISTS")?;
    for topic in &config.topics {
        let root = expand_home(&topic.path);
        writeln!(
            out,
            "{:<20} {:<10} {:<8} {}",
            topic.name,
            "directory",
            root.exists(),
            root.display()
        )?;
    }
    Ok(())
}
