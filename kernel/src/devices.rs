//! Device and Driver Manager
//!
//! Uniform device and driver tables for everything that hangs off the
//! kernel: a device tree with slash-separated paths, driver records with
//! supported-id lists, and the two-way binding walk (new device looks for
//! a driver, new driver sweeps unbound devices). Drivers dispatch through
//! a fixed operation vtable and report the canonical error codes.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use crate::config::{MAX_DEVICES, MAX_DRIVERS};
use crate::errno::{Errno, KResult};
use crate::Kernel;

/// Device ID type
pub type DeviceId = u32;

/// Driver ID type
pub type DriverId = u32;

/// The synthetic root of the device tree, path `/`
pub const ROOT_DEVICE: DeviceId = 0;

/// Device type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Bus,
    Block,
    Char,
    Display,
    Input,
    Network,
    Sound,
    Other,
}

/// Device status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Registered, no driver bound yet
    Initializing,
    /// Driver bound and initialized
    Online,
    /// Driver initialization failed
    Error,
    /// Administratively removed
    Offline,
}

/// Device flags
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFlags(pub u32);

impl DeviceFlags {
    pub const NONE: u32 = 0;
    pub const REMOVABLE: u32 = 1 << 0;
    pub const VIRTUAL: u32 = 1 << 1;
}

/// Hardware identity used for driver matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceIds {
    pub vendor: u16,
    pub device: u16,
    pub class: u32,
}

/// Resource descriptors a driver needs to reach the hardware
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceResources {
    pub mmio_base: u64,
    pub mmio_size: u64,
    pub port_base: u16,
    pub port_count: u16,
    pub irq: Option<u8>,
    pub dma_channel: Option<u8>,
}

/// Snapshot of a device handed to driver hooks and operations. Built
/// under the registry lock, used outside it, so a hook can take as long
/// as it likes without stalling the registry.
#[derive(Clone)]
pub struct DeviceCtx {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub ids: DeviceIds,
    pub resources: DeviceResources,
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

/// Device operation table. Unimplemented entries report `Unsupported`;
/// reads and writes are byte-oriented and seek semantics belong to the
/// device.
pub trait DeviceOps: Send + Sync {
    fn open(&self, _dev: &DeviceCtx) -> KResult<()> {
        Ok(())
    }

    fn close(&self, _dev: &DeviceCtx) -> KResult<()> {
        Ok(())
    }

    fn read(&self, _dev: &DeviceCtx, _buf: &mut [u8]) -> KResult<usize> {
        Err(Errno::Unsupported)
    }

    fn write(&self, _dev: &DeviceCtx, _buf: &[u8]) -> KResult<usize> {
        Err(Errno::Unsupported)
    }

    fn ioctl(&self, _dev: &DeviceCtx, _request: u32, _arg: usize) -> KResult<i32> {
        Err(Errno::Unsupported)
    }

    fn mmap(&self, _dev: &DeviceCtx, _len: usize) -> KResult<u64> {
        Err(Errno::Unsupported)
    }

    fn poll(&self, _dev: &DeviceCtx) -> KResult<u32> {
        Ok(0)
    }
}

/// Driver identity and the hardware it claims
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Supported (vendor, device) pairs
    pub supported: &'static [(u16, u16)],
}

/// A device driver: match-and-probe hooks plus the default operation
/// table bound to the devices it claims.
pub trait Driver: Send + Sync {
    fn info(&self) -> &DriverInfo;

    /// Decide whether this driver can run the device
    fn probe(&self, dev: &DeviceCtx) -> KResult<()>;

    /// Bring the device up after a successful bind
    fn init(&self, _dev: &DeviceCtx) -> KResult<()> {
        Ok(())
    }

    /// Tear down on unbind or unregistration
    fn exit(&self, _dev: &DeviceCtx) {}

    /// Operation table for devices bound to this driver
    fn ops(&self) -> Arc<dyn DeviceOps>;
}

/// Everything needed to register a device
pub struct DeviceDesc {
    pub name: String,
    /// Parent in the tree; `None` hangs the device off the root
    pub parent: Option<DeviceId>,
    pub device_type: DeviceType,
    pub flags: DeviceFlags,
    pub ids: DeviceIds,
    pub resources: DeviceResources,
    /// Operation table for devices that carry their own (no driver bind)
    pub ops: Option<Arc<dyn DeviceOps>>,
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

/// Snapshot of one device for diagnostics
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub parent: DeviceId,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub flags: DeviceFlags,
    pub ids: DeviceIds,
    pub driver: Option<DriverId>,
    pub children: Vec<DeviceId>,
}

/// Device record
struct Device {
    id: DeviceId,
    name: String,
    parent: DeviceId,
    children: Vec<DeviceId>,
    device_type: DeviceType,
    status: DeviceStatus,
    flags: DeviceFlags,
    ids: DeviceIds,
    resources: DeviceResources,
    ops: Option<Arc<dyn DeviceOps>>,
    driver: Option<DriverId>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
    open_count: u32,
}

/// Registry behind the single registry spinlock
pub(crate) struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
    drivers: BTreeMap<DriverId, Arc<dyn Driver>>,
    next_device: DeviceId,
    next_driver: DriverId,
}

impl DeviceRegistry {
    pub(crate) fn new() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(
            ROOT_DEVICE,
            Device {
                id: ROOT_DEVICE,
                name: String::new(),
                parent: ROOT_DEVICE,
                children: Vec::new(),
                device_type: DeviceType::Bus,
                status: DeviceStatus::Online,
                flags: DeviceFlags(DeviceFlags::VIRTUAL),
                ids: DeviceIds::default(),
                resources: DeviceResources::default(),
                ops: None,
                driver: None,
                payload: None,
                open_count: 0,
            },
        );
        Self {
            devices,
            drivers: BTreeMap::new(),
            next_device: 1,
            next_driver: 1,
        }
    }

    fn ctx(&self, id: DeviceId) -> Option<DeviceCtx> {
        self.devices.get(&id).map(|d| DeviceCtx {
            id: d.id,
            name: d.name.clone(),
            device_type: d.device_type,
            ids: d.ids,
            resources: d.resources,
            payload: d.payload.clone(),
        })
    }
}

impl Kernel {
    /// Register a device. If a registered driver claims its ids, the
    /// driver is probed and bound before this returns.
    pub fn register_device(&self, desc: DeviceDesc) -> KResult<DeviceId> {
        let parent = desc.parent.unwrap_or(ROOT_DEVICE);
        if desc.name.is_empty() || desc.name.contains('/') {
            return Err(Errno::Invalid);
        }

        let id = {
            let mut reg = self.devices.acquire(self.platform());
            if reg.devices.len() >= MAX_DEVICES {
                return Err(Errno::Resource);
            }
            match reg.devices.get(&parent) {
                None => return Err(Errno::NoDevice),
                Some(p) => {
                    let duplicate = p
                        .children
                        .iter()
                        .any(|c| reg.devices.get(c).map(|d| d.name == desc.name).unwrap_or(false));
                    if duplicate {
                        return Err(Errno::Exists);
                    }
                }
            }

            let id = reg.next_device;
            reg.next_device += 1;

            reg.devices.insert(
                id,
                Device {
                    id,
                    name: desc.name,
                    parent,
                    children: Vec::new(),
                    device_type: desc.device_type,
                    status: if desc.ops.is_some() {
                        DeviceStatus::Online
                    } else {
                        DeviceStatus::Initializing
                    },
                    flags: desc.flags,
                    ids: desc.ids,
                    resources: desc.resources,
                    ops: desc.ops,
                    driver: None,
                    payload: desc.payload,
                    open_count: 0,
                },
            );
            if let Some(p) = reg.devices.get_mut(&parent) {
                p.children.push(id);
            }
            id
        };

        crate::log_debug!("[DEVMGR] registered device {} under {}", id, parent);
        self.try_bind_device(id);
        Ok(id)
    }

    /// Remove a device. Fails while it has children or open handles.
    pub fn unregister_device(&self, id: DeviceId) -> KResult<()> {
        if id == ROOT_DEVICE {
            return Err(Errno::Invalid);
        }

        let (driver, ctx) = {
            let reg = self.devices.acquire(self.platform());
            let dev = reg.devices.get(&id).ok_or(Errno::NoDevice)?;
            if !dev.children.is_empty() || dev.open_count > 0 {
                return Err(Errno::Busy);
            }
            let ctx = reg.ctx(id).ok_or(Errno::NoDevice)?;
            (dev.driver.and_then(|d| reg.drivers.get(&d).cloned()), ctx)
        };

        if let Some(driver) = driver {
            driver.exit(&ctx);
        }

        let mut reg = self.devices.acquire(self.platform());
        let parent = match reg.devices.remove(&id) {
            Some(d) => d.parent,
            None => return Err(Errno::NoDevice),
        };
        if let Some(p) = reg.devices.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        crate::log_debug!("[DEVMGR] unregistered device {}", id);
        Ok(())
    }

    /// Register a driver and sweep unbound devices for matches
    pub fn register_driver(&self, driver: Arc<dyn Driver>) -> KResult<DriverId> {
        let id = {
            let mut reg = self.devices.acquire(self.platform());
            if reg.drivers.len() >= MAX_DRIVERS {
                return Err(Errno::Resource);
            }
            let name = driver.info().name;
            if reg.drivers.values().any(|d| d.info().name == name) {
                return Err(Errno::Exists);
            }
            let id = reg.next_driver;
            reg.next_driver += 1;
            reg.drivers.insert(id, driver.clone());
            id
        };

        crate::log!("[DEVMGR] registered driver '{}' v{}", driver.info().name, driver.info().version);

        // Sweep devices that are still driverless
        let unbound: Vec<DeviceId> = {
            let reg = self.devices.acquire(self.platform());
            reg.devices
                .values()
                .filter(|d| d.id != ROOT_DEVICE && d.driver.is_none())
                .map(|d| d.id)
                .collect()
        };
        for dev in unbound {
            self.try_bind_device(dev);
        }
        Ok(id)
    }

    /// Unregister a driver, unbinding every device it serves
    pub fn unregister_driver(&self, id: DriverId) -> KResult<()> {
        let (driver, bound): (Arc<dyn Driver>, Vec<DeviceId>) = {
            let reg = self.devices.acquire(self.platform());
            let driver = reg.drivers.get(&id).cloned().ok_or(Errno::NotFound)?;
            let bound = reg
                .devices
                .values()
                .filter(|d| d.driver == Some(id))
                .map(|d| d.id)
                .collect();
            (driver, bound)
        };

        for dev in &bound {
            let ctx = {
                let reg = self.devices.acquire(self.platform());
                reg.ctx(*dev)
            };
            if let Some(ctx) = ctx {
                driver.exit(&ctx);
            }
            let mut reg = self.devices.acquire(self.platform());
            if let Some(d) = reg.devices.get_mut(dev) {
                d.driver = None;
                d.ops = None;
                d.status = DeviceStatus::Initializing;
            }
        }

        let mut reg = self.devices.acquire(self.platform());
        reg.drivers.remove(&id);
        crate::log!("[DEVMGR] unregistered driver {}", id);
        Ok(())
    }

    /// First registered driver whose supported list matches the device
    pub fn find_driver_for(&self, device: DeviceId) -> KResult<DriverId> {
        let reg = self.devices.acquire(self.platform());
        let dev = reg.devices.get(&device).ok_or(Errno::NoDevice)?;
        reg.drivers
            .iter()
            .find(|(_, drv)| {
                drv.info()
                    .supported
                    .iter()
                    .any(|(v, d)| *v == dev.ids.vendor && *d == dev.ids.device)
            })
            .map(|(id, _)| *id)
            .ok_or(Errno::NotFound)
    }

    /// Look up a device snapshot by id
    pub fn find_device(&self, id: DeviceId) -> KResult<DeviceInfo> {
        let reg = self.devices.acquire(self.platform());
        reg.devices.get(&id).map(device_info).ok_or(Errno::NoDevice)
    }

    /// Look up a device by name (first match in id order)
    pub fn find_device_by_name(&self, name: &str) -> KResult<DeviceId> {
        let reg = self.devices.acquire(self.platform());
        reg.devices
            .values()
            .find(|d| d.name == name)
            .map(|d| d.id)
            .ok_or(Errno::NoDevice)
    }

    /// All devices of a type, in id order
    pub fn find_devices_by_type(&self, device_type: DeviceType) -> Vec<DeviceId> {
        let reg = self.devices.acquire(self.platform());
        reg.devices
            .values()
            .filter(|d| d.device_type == device_type && d.id != ROOT_DEVICE)
            .map(|d| d.id)
            .collect()
    }

    /// Slash-separated path from the root to this device
    pub fn device_path(&self, id: DeviceId) -> KResult<String> {
        let reg = self.devices.acquire(self.platform());
        let mut dev = reg.devices.get(&id).ok_or(Errno::NoDevice)?;

        let mut parts: Vec<&str> = Vec::new();
        while dev.id != ROOT_DEVICE {
            parts.push(&dev.name);
            dev = reg.devices.get(&dev.parent).ok_or(Errno::NoDevice)?;
        }

        let mut path = String::from("/");
        for (i, part) in parts.iter().rev().enumerate() {
            if i > 0 {
                path.push('/');
            }
            path.push_str(part);
        }
        Ok(path)
    }

    /// Open a device through its operation table
    pub fn device_open(&self, id: DeviceId) -> KResult<()> {
        let (ops, ctx) = self.device_ops(id)?;
        ops.open(&ctx)?;
        let mut reg = self.devices.acquire(self.platform());
        if let Some(d) = reg.devices.get_mut(&id) {
            d.open_count += 1;
        }
        Ok(())
    }

    /// Close a previously opened device
    pub fn device_close(&self, id: DeviceId) -> KResult<()> {
        let (ops, ctx) = self.device_ops(id)?;
        ops.close(&ctx)?;
        let mut reg = self.devices.acquire(self.platform());
        if let Some(d) = reg.devices.get_mut(&id) {
            d.open_count = d.open_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Read bytes from a device
    pub fn device_read(&self, id: DeviceId, buf: &mut [u8]) -> KResult<usize> {
        let (ops, ctx) = self.device_ops(id)?;
        ops.read(&ctx, buf)
    }

    /// Write bytes to a device
    pub fn device_write(&self, id: DeviceId, buf: &[u8]) -> KResult<usize> {
        let (ops, ctx) = self.device_ops(id)?;
        ops.write(&ctx, buf)
    }

    /// Device control operation
    pub fn device_ioctl(&self, id: DeviceId, request: u32, arg: usize) -> KResult<i32> {
        let (ops, ctx) = self.device_ops(id)?;
        ops.ioctl(&ctx, request, arg)
    }

    /// Number of registered devices (excluding the root)
    pub fn device_count(&self) -> usize {
        self.devices.acquire(self.platform()).devices.len() - 1
    }

    fn device_ops(&self, id: DeviceId) -> KResult<(Arc<dyn DeviceOps>, DeviceCtx)> {
        let reg = self.devices.acquire(self.platform());
        let dev = reg.devices.get(&id).ok_or(Errno::NoDevice)?;
        let ops = dev.ops.clone().ok_or(Errno::Unsupported)?;
        let ctx = reg.ctx(id).ok_or(Errno::NoDevice)?;
        Ok((ops, ctx))
    }

    /// Walk the driver table for a device without a driver; first probe
    /// that succeeds wins. Probe and init run outside the registry lock.
    fn try_bind_device(&self, id: DeviceId) {
        let (ctx, candidates): (DeviceCtx, Vec<(DriverId, Arc<dyn Driver>)>) = {
            let reg = self.devices.acquire(self.platform());
            let dev = match reg.devices.get(&id) {
                Some(d) if d.driver.is_none() => d,
                _ => return,
            };
            let ctx = match reg.ctx(id) {
                Some(c) => c,
                None => return,
            };
            let candidates = reg
                .drivers
                .iter()
                .filter(|(_, drv)| {
                    drv.info()
                        .supported
                        .iter()
                        .any(|(v, d)| *v == dev.ids.vendor && *d == dev.ids.device)
                })
                .map(|(drv_id, drv)| (*drv_id, drv.clone()))
                .collect();
            (ctx, candidates)
        };

        for (drv_id, driver) in candidates {
            if driver.probe(&ctx).is_err() {
                continue;
            }

            // Bind, then initialize; a failed init rolls the bind back
            {
                let mut reg = self.devices.acquire(self.platform());
                match reg.devices.get_mut(&id) {
                    Some(d) if d.driver.is_none() => {
                        d.driver = Some(drv_id);
                        d.ops = Some(driver.ops());
                    }
                    _ => return,
                }
            }

            match driver.init(&ctx) {
                Ok(()) => {
                    let mut reg = self.devices.acquire(self.platform());
                    if let Some(d) = reg.devices.get_mut(&id) {
                        d.status = DeviceStatus::Online;
                    }
                    crate::log!(
                        "[DEVMGR] bound driver '{}' to device {}",
                        driver.info().name,
                        id
                    );
                    return;
                }
                Err(e) => {
                    let mut reg = self.devices.acquire(self.platform());
                    if let Some(d) = reg.devices.get_mut(&id) {
                        d.driver = None;
                        d.ops = None;
                        d.status = DeviceStatus::Error;
                    }
                    crate::log_warn!(
                        "[DEVMGR] driver '{}' failed to init device {}: {}",
                        driver.info().name,
                        id,
                        e.as_str()
                    );
                }
            }
        }
    }
}

fn device_info(d: &Device) -> DeviceInfo {
    DeviceInfo {
        id: d.id,
        name: d.name.clone(),
        parent: d.parent,
        device_type: d.device_type,
        status: d.status,
        flags: d.flags,
        ids: d.ids,
        driver: d.driver,
        children: d.children.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::boot_kernel;
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn desc(name: &str, parent: Option<DeviceId>, ids: DeviceIds) -> DeviceDesc {
        DeviceDesc {
            name: String::from(name),
            parent,
            device_type: DeviceType::Char,
            flags: DeviceFlags::default(),
            ids,
            resources: DeviceResources::default(),
            ops: None,
            payload: None,
        }
    }

    struct LoopOps {
        reads: AtomicUsize,
    }

    impl DeviceOps for LoopOps {
        fn read(&self, _dev: &DeviceCtx, buf: &mut [u8]) -> KResult<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            for (i, b) in buf.iter_mut().enumerate() {
                *b = i as u8;
            }
            Ok(buf.len())
        }

        fn write(&self, _dev: &DeviceCtx, buf: &[u8]) -> KResult<usize> {
            Ok(buf.len())
        }
    }

    struct TestDriver {
        info: DriverInfo,
        ops: Arc<LoopOps>,
        probes: AtomicUsize,
        fail_init: AtomicBool,
    }

    impl TestDriver {
        fn new(name: &'static str, supported: &'static [(u16, u16)]) -> Arc<Self> {
            Arc::new(Self {
                info: DriverInfo { name, version: "0.1", supported },
                ops: Arc::new(LoopOps { reads: AtomicUsize::new(0) }),
                probes: AtomicUsize::new(0),
                fail_init: AtomicBool::new(false),
            })
        }
    }

    impl Driver for TestDriver {
        fn info(&self) -> &DriverInfo {
            &self.info
        }

        fn probe(&self, _dev: &DeviceCtx) -> KResult<()> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn init(&self, _dev: &DeviceCtx) -> KResult<()> {
            if self.fail_init.load(Ordering::SeqCst) {
                Err(Errno::Io)
            } else {
                Ok(())
            }
        }

        fn ops(&self) -> Arc<dyn DeviceOps> {
            self.ops.clone()
        }
    }

    const SERIAL_IDS: DeviceIds = DeviceIds { vendor: 0x1234, device: 0x0001, class: 0x07 };

    #[test]
    fn paths_follow_the_tree() {
        let k = boot_kernel();
        let bus = k
            .register_device(desc("pci0", None, DeviceIds::default()))
            .unwrap();
        let dev = k.register_device(desc("serial0", Some(bus), SERIAL_IDS)).unwrap();

        assert_eq!(k.device_path(ROOT_DEVICE).unwrap(), "/");
        assert_eq!(k.device_path(bus).unwrap(), "/pci0");
        assert_eq!(k.device_path(dev).unwrap(), "/pci0/serial0");
    }

    #[test]
    fn sibling_names_must_be_unique() {
        let k = boot_kernel();
        let bus = k.register_device(desc("bus", None, DeviceIds::default())).unwrap();
        k.register_device(desc("eth0", Some(bus), DeviceIds::default())).unwrap();

        assert_eq!(
            k.register_device(desc("eth0", Some(bus), DeviceIds::default())).unwrap_err(),
            Errno::Exists
        );
        // Same name under a different parent is fine
        k.register_device(desc("eth0", None, DeviceIds::default())).unwrap();
    }

    #[test]
    fn driver_binds_existing_and_future_devices() {
        let k = boot_kernel();
        let before = k.register_device(desc("uart0", None, SERIAL_IDS)).unwrap();

        static SUPPORTED: [(u16, u16); 1] = [(0x1234, 0x0001)];
        let driver = TestDriver::new("uart", &SUPPORTED);
        k.register_driver(driver.clone()).unwrap();

        // Registration swept the pre-existing device
        assert_eq!(k.find_device(before).unwrap().status, DeviceStatus::Online);
        assert_eq!(driver.probes.load(Ordering::SeqCst), 1);

        // And a later hot-plug binds on arrival
        let after = k.register_device(desc("uart1", None, SERIAL_IDS)).unwrap();
        assert_eq!(k.find_device(after).unwrap().status, DeviceStatus::Online);
        assert_eq!(k.find_driver_for(after).unwrap(), k.find_device(after).unwrap().driver.unwrap());

        let mut buf = [0u8; 4];
        assert_eq!(k.device_read(after, &mut buf), Ok(4));
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn failed_init_rolls_the_binding_back() {
        let k = boot_kernel();
        static SUPPORTED: [(u16, u16); 1] = [(0x1234, 0x0001)];
        let driver = TestDriver::new("flaky", &SUPPORTED);
        driver.fail_init.store(true, Ordering::SeqCst);
        k.register_driver(driver.clone()).unwrap();

        let dev = k.register_device(desc("bad0", None, SERIAL_IDS)).unwrap();
        let info = k.find_device(dev).unwrap();
        assert_eq!(info.driver, None);
        assert_eq!(info.status, DeviceStatus::Error);
        assert_eq!(k.device_read(dev, &mut [0u8; 1]).unwrap_err(), Errno::Unsupported);
    }

    #[test]
    fn duplicate_driver_names_are_rejected() {
        let k = boot_kernel();
        static SUPPORTED: [(u16, u16); 1] = [(0x1111, 0x2222)];
        k.register_driver(TestDriver::new("dup", &SUPPORTED)).unwrap();
        assert_eq!(
            k.register_driver(TestDriver::new("dup", &SUPPORTED)).unwrap_err(),
            Errno::Exists
        );
    }

    #[test]
    fn unregister_rules() {
        let k = boot_kernel();
        let bus = k.register_device(desc("bus0", None, DeviceIds::default())).unwrap();
        let child = k.register_device(desc("disk0", Some(bus), DeviceIds::default())).unwrap();

        // A parent with children refuses to go
        assert_eq!(k.unregister_device(bus).unwrap_err(), Errno::Busy);
        k.unregister_device(child).unwrap();
        k.unregister_device(bus).unwrap();
        assert_eq!(k.find_device(bus).unwrap_err(), Errno::NoDevice);
    }

    #[test]
    fn unregister_driver_unbinds_devices() {
        let k = boot_kernel();
        static SUPPORTED: [(u16, u16); 1] = [(0x1234, 0x0001)];
        let driver = TestDriver::new("transient", &SUPPORTED);
        let drv_id = k.register_driver(driver).unwrap();

        let dev = k.register_device(desc("tty0", None, SERIAL_IDS)).unwrap();
        assert_eq!(k.find_device(dev).unwrap().driver, Some(drv_id));

        k.unregister_driver(drv_id).unwrap();
        let info = k.find_device(dev).unwrap();
        assert_eq!(info.driver, None);
        assert_eq!(info.status, DeviceStatus::Initializing);
    }
}
