use super::tables::{TableBuilder, add_field};
use super::{Report, Session, write_problems};
use crate::error::{Error, Result};
use crate::walk::ListWalker;
use std::io::Write;
use std::ops::ControlFlow;

/// kobject names are short, anything longer is garbage.
const MAX_NAME: usize = 64;

pub struct Devices;

impl Report for Devices {
    fn name(&self) -> &'static str {
        "devices"
    }

    fn description(&self) -> &'static str {
        "devices in registration order"
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()> {
        let slot = session.symbol("devices_kset")?;
        let kset = session.space.read_pointer(slot)?;
        if kset == 0 {
            return Err(Error::corrupt(slot, "devices_kset is NULL"));
        }
        let head = session.view(kset, "struct kset").field_addr("list")?;
        let link = session.types.field_offset("struct kobject", "entry")?;
        let has_device = session.types.has_field("struct device", "kobj");

        let mut builder = TableBuilder::new();
        builder.add_col_r("device", "address of the struct device, blank if unknown");
        builder.add_col_r("kobject", "address of the device's kobject");
        builder.add_col_l("name", "kobject name");

        let mut skipped = Vec::new();
        let walk = ListWalker::new(&session.space, head, link)
            .layout(session.list_layout())
            .limits(session.limits())
            .walk(|kobj| {
                let name = match session.view(kobj, "struct kobject").get_cstring_ptr("name", MAX_NAME) {
                    Ok(name) => name.unwrap_or_default(),
                    Err(err) => {
                        skipped.push(Error::corrupt(kobj, format!("unreadable name: {err}")));
                        "?".to_string()
                    }
                };
                let device = if has_device {
                    session
                        .types
                        .container_of(kobj, "struct device", "kobj")
                        .map(|addr| format!("{addr:x}"))
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                add_field!(builder, "device", device);
                add_field!(builder, "kobject", "{:x}", kobj);
                add_field!(builder, "name", name);
                ControlFlow::Continue(())
            });

        builder.write(out, true, session.explain)?;
        write_problems(out, "devices_kset", &walk, &skipped)
    }
}
