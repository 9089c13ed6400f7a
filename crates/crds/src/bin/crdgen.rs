//! Prints the provider CRD manifests as a multi-document YAML stream.

use crds::{EdgeCluster, EdgeMachine, EdgeMachineTemplate, MachineBinding, TunnelConnection};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        EdgeMachine::crd(),
        EdgeCluster::crd(),
        EdgeMachineTemplate::crd(),
        MachineBinding::crd(),
        TunnelConnection::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
