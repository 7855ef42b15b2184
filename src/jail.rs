use crate::{
    error::Result,
    jailer::ChildJailer,
    kernel::Kernel,
    param::{JailId, ParamSet},
    sys::{HostSys, JailFlags, JailSys},
};

/// Handle to a jail: its id and name.
///
/// The handle outlives the jail it names. Once the jail is removed, every
/// operation reports the kernel's error.
#[derive(Debug, Clone)]
pub struct Jail<S: JailSys = HostSys> {
    id: JailId,
    name: String,
    kernel: Kernel<S>,
}

impl Jail<HostSys> {
    /// Creates a jail. `params` must contain a string `name`.
    pub fn create(params: &ParamSet) -> Result<Self> {
        Self::create_with(Kernel::host(), params)
    }

    /// Creates a jail and attaches the calling process to it.
    pub fn create_and_attach(params: &ParamSet) -> Result<Self> {
        Self::create_and_attach_with(Kernel::host(), params)
    }

    pub fn get_by_name(name: &str) -> Result<Self> {
        Self::get_by_name_with(Kernel::host(), name)
    }

    pub fn get_by_id(jid: JailId) -> Result<Self> {
        Self::get_by_id_with(Kernel::host(), jid)
    }
}

impl<S: JailSys> Jail<S> {
    pub fn create_with(kernel: Kernel<S>, params: &ParamSet) -> Result<Self> {
        Self::create_flags(kernel, params, JailFlags::CREATE)
    }

    pub fn create_and_attach_with(kernel: Kernel<S>, params: &ParamSet) -> Result<Self> {
        Self::create_flags(kernel, params, JailFlags::CREATE | JailFlags::ATTACH)
    }

    pub fn get_by_name_with(kernel: Kernel<S>, name: &str) -> Result<Self> {
        let (id, _) = kernel.get_params(&ParamSet::new().with("name", name), JailFlags::empty())?;
        Ok(Self {
            id,
            name: name.to_owned(),
            kernel,
        })
    }

    pub fn get_by_id_with(kernel: Kernel<S>, jid: JailId) -> Result<Self> {
        let name = kernel.get_name(jid)?;
        Ok(Self {
            id: jid,
            name,
            kernel,
        })
    }

    fn create_flags(kernel: Kernel<S>, params: &ParamSet, flags: JailFlags) -> Result<Self> {
        let name = params.require_name()?.to_owned();
        let id = kernel.set_params(params, flags)?;

        tracing::info!(%id, name, ?flags, "created jail");
        Ok(Self { id, name, kernel })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn id(&self) -> JailId {
        self.id
    }

    /// Attaches the calling process to this jail. Irreversible.
    pub fn attach(&self) -> Result<()> {
        self.kernel.attach(self.id)
    }

    /// Kills every process in the jail and removes it.
    pub fn destroy(&self) -> Result<()> {
        self.kernel.remove(self.id)?;
        tracing::info!(id = %self.id, name = %self.name, "destroyed jail");
        Ok(())
    }

    /// Updates the jail; `jid` is filled in from the handle.
    pub fn set(&self, params: &ParamSet) -> Result<()> {
        let params = params.clone().with("jid", self.id);
        self.kernel.set_params(&params, JailFlags::UPDATE)?;
        Ok(())
    }
}

impl<S: JailSys + Clone> Jail<S> {
    /// Creates a jail nested inside this one, raising `children.max` if needed.
    pub fn create_child(&self, params: &ParamSet) -> Result<Jail<S>> {
        let name = params.require_name()?.to_owned();
        let id = ChildJailer::new(&self.kernel, self.id).spawn(params)?;

        Ok(Jail {
            id,
            name,
            kernel: self.kernel.clone(),
        })
    }
}
