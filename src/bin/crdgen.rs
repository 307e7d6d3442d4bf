use kube::CustomResourceExt;
use peering_operator::crd::PeeringServer;

fn main() {
    print!("{}", serde_yaml::to_string(&PeeringServer::crd()).unwrap());
}
