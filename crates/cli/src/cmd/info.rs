use anyhow::Result;
use serde_json::json;

use rebuilder_lib::platform::Platform;

use crate::output::{OutputFormat, print_json, print_stat, print_warning};

pub fn cmd_info(format: OutputFormat) -> Result<()> {
  let platform = Platform::current();

  if format.is_json() {
    return print_json(&json!({
      "version": env!("CARGO_PKG_VERSION"),
      "os": platform.map(|p| p.os.as_str()),
      "arch": platform.map(|p| p.arch.as_str()),
      "subdir": platform.map(|p| p.subdir()),
    }));
  }

  println!("rebuilder {}", env!("CARGO_PKG_VERSION"));
  match platform {
    Some(platform) => {
      print_stat("OS", platform.os.as_str());
      print_stat("Arch", platform.arch.as_str());
      print_stat("Subdir", &platform.subdir());
    }
    None => print_warning("Could not detect platform."),
  }
  Ok(())
}
